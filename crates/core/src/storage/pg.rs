use crate::domain::analyst::{Analyst, AnalystPerformance};
use crate::domain::idea::{Idea, PositionType};
use crate::performance::{AnalystStore, IdeaStore};
use anyhow::Context;
use chrono::{DateTime, Utc};

const IDEA_COLUMNS: &str = "id, analyst_id, symbol, position_type, entry_price, price_target, \
                            last_price, created_at, closed_date";

type IdeaRow = (
    i64,
    i64,
    String,
    String,
    f64,
    f64,
    f64,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
);

/// Postgres-backed idea and analyst store over the `ideas` and `users` tables.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: sqlx::PgPool,
}

impl PgStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

fn idea_from_row(row: IdeaRow) -> anyhow::Result<Idea> {
    let (
        id,
        analyst_id,
        symbol,
        position_type,
        entry_price,
        price_target,
        last_price,
        created_at,
        closed_date,
    ) = row;

    let position_type = position_type
        .parse::<PositionType>()
        .with_context(|| format!("invalid position_type in DB for idea_id={id}"))?;

    Ok(Idea {
        id,
        analyst_id,
        symbol,
        position_type,
        entry_price,
        price_target,
        last_price,
        created_at,
        closed_date,
    })
}

#[async_trait::async_trait]
impl IdeaStore for PgStore {
    async fn list_ideas(&self) -> anyhow::Result<Vec<Idea>> {
        let sql = format!("SELECT {IDEA_COLUMNS} FROM ideas ORDER BY id ASC");
        let rows = sqlx::query_as::<_, IdeaRow>(&sql)
            .persistent(false)
            .fetch_all(&self.pool)
            .await
            .context("select ideas failed")?;

        rows.into_iter().map(idea_from_row).collect()
    }

    async fn update_last_price(&self, idea_id: i64, last_price: f64) -> anyhow::Result<()> {
        anyhow::ensure!(
            last_price.is_finite() && last_price > 0.0,
            "last_price must be positive (got {last_price})"
        );

        // Closed ideas are frozen; the predicate keeps a late write from
        // overwriting a price that was locked in meanwhile.
        let res = sqlx::query(
            "UPDATE ideas SET last_price = $2 WHERE id = $1 AND closed_date IS NULL",
        )
        .persistent(false)
        .bind(idea_id)
        .bind(last_price)
        .execute(&self.pool)
        .await
        .context("update ideas.last_price failed")?;

        if res.rows_affected() == 0 {
            tracing::debug!(idea_id, "idea closed or removed before price write; skipped");
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl AnalystStore for PgStore {
    async fn list_active_analysts(&self) -> anyhow::Result<Vec<Analyst>> {
        let rows = sqlx::query_as::<_, (i64, String, i32)>(
            "SELECT id, username, num_ideas \
             FROM users \
             WHERE is_analyst AND num_ideas > 0 \
             ORDER BY id ASC",
        )
        .persistent(false)
        .fetch_all(&self.pool)
        .await
        .context("select analysts failed")?;

        Ok(rows
            .into_iter()
            .map(|(id, username, num_ideas)| Analyst {
                id,
                username,
                num_ideas,
            })
            .collect())
    }

    async fn ideas_for_analyst(&self, analyst_id: i64) -> anyhow::Result<Vec<Idea>> {
        let sql = format!("SELECT {IDEA_COLUMNS} FROM ideas WHERE analyst_id = $1 ORDER BY id ASC");
        let rows = sqlx::query_as::<_, IdeaRow>(&sql)
            .persistent(false)
            .bind(analyst_id)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("select ideas failed (analyst_id={analyst_id})"))?;

        rows.into_iter().map(idea_from_row).collect()
    }

    async fn save_performance(
        &self,
        rows: &[AnalystPerformance],
        unranked: &[i64],
    ) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await.context("begin transaction failed")?;

        for p in rows {
            sqlx::query(
                "UPDATE users SET \
                   avg_return = $2, avg_return_percentile = $3, \
                   avg_price_target_capture = $4, avg_price_target_capture_percentile = $5, \
                   success_rate = $6, success_rate_percentile = $7, \
                   avg_holding_period = $8, avg_holding_period_percentile = $9, \
                   analyst_rank = $10, analyst_rank_percentile = $11 \
                 WHERE id = $1",
            )
            .persistent(false)
            .bind(p.analyst_id)
            .bind(p.avg_return)
            .bind(p.avg_return_percentile)
            .bind(p.avg_price_target_capture)
            .bind(p.avg_price_target_capture_percentile)
            .bind(p.success_rate)
            .bind(p.success_rate_percentile)
            .bind(p.avg_holding_period_days)
            .bind(p.avg_holding_period_percentile)
            .bind(p.analyst_rank)
            .bind(p.analyst_rank_percentile)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("update users performance failed (id={})", p.analyst_id))?;
        }

        if !unranked.is_empty() {
            sqlx::query(
                "UPDATE users SET analyst_rank = 0, analyst_rank_percentile = 0 \
                 WHERE id = ANY($1)",
            )
            .persistent(false)
            .bind(unranked)
            .execute(&mut *tx)
            .await
            .context("reset stale analyst ranks failed")?;
        }

        tx.commit().await.context("commit transaction failed")?;
        tracing::debug!(
            rows = rows.len(),
            unranked = unranked.len(),
            "analyst performance persisted"
        );
        Ok(())
    }
}
