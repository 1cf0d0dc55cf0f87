use crate::domain::analyst::{AnalystPerformance, LeaderboardEntry};
use anyhow::{bail, Context};

pub const DEFAULT_PAGE_SIZE: u32 = 25;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    AnalystRank,
    SuccessRate,
    AvgReturn,
    NumIdeas,
    AvgHoldingPeriod,
    NumFollowers,
    AvgPriceTargetCapture,
}

impl SortColumn {
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        Ok(match s.trim() {
            "analyst_rank" => Self::AnalystRank,
            "success_rate" => Self::SuccessRate,
            "avg_return" => Self::AvgReturn,
            "num_ideas" => Self::NumIdeas,
            "avg_holding_period" => Self::AvgHoldingPeriod,
            "num_followers" => Self::NumFollowers,
            "avg_price_target_capture" => Self::AvgPriceTargetCapture,
            other => bail!("unsupported sortColumn: {other:?}"),
        })
    }

    fn sql_expr(&self) -> &'static str {
        match self {
            // Rank 0 means "not ranked yet".
            Self::AnalystRank => "NULLIF(analyst_rank, 0)",
            Self::SuccessRate => "success_rate",
            Self::AvgReturn => "avg_return",
            Self::NumIdeas => "num_ideas",
            Self::AvgHoldingPeriod => "avg_holding_period",
            Self::NumFollowers => "num_followers",
            Self::AvgPriceTargetCapture => "avg_price_target_capture",
        }
    }

    /// Best first: rank 1 is the top, every other column is higher-is-better.
    fn default_order(&self) -> SortOrder {
        match self {
            Self::AnalystRank => SortOrder::Asc,
            _ => SortOrder::Desc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => bail!("unsupported orderType: {other:?}"),
        }
    }

    fn sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardQuery {
    pub sort: SortColumn,
    pub order: SortOrder,
    pub page: u32,
    pub page_size: u32,
}

impl Default for LeaderboardQuery {
    fn default() -> Self {
        Self {
            sort: SortColumn::AnalystRank,
            order: SortOrder::Asc,
            page: 0,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl LeaderboardQuery {
    pub fn try_new(
        sort_column: Option<&str>,
        order_type: Option<&str>,
        page: Option<u32>,
        page_size: Option<u32>,
    ) -> anyhow::Result<Self> {
        let sort = match sort_column {
            Some(s) => SortColumn::parse(s)?,
            None => SortColumn::AnalystRank,
        };
        let order = match order_type {
            Some(s) => SortOrder::parse(s)?,
            None => sort.default_order(),
        };
        let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        anyhow::ensure!(
            (1..=MAX_PAGE_SIZE).contains(&page_size),
            "pageSize must be 1..={MAX_PAGE_SIZE} (got {page_size})"
        );

        Ok(Self {
            sort,
            order,
            page: page.unwrap_or(0),
            page_size,
        })
    }

    fn order_by(&self) -> String {
        format!(
            "{} {} NULLS LAST, id ASC",
            self.sort.sql_expr(),
            self.order.sql()
        )
    }

    fn offset(&self) -> i64 {
        i64::from(self.page) * i64::from(self.page_size)
    }
}

type LeaderboardRow = (
    i64,
    String,
    i32,
    i32,
    f64,
    f64,
    f64,
    f64,
    f64,
    f64,
    f64,
    f64,
    i32,
    f64,
);

const LEADERBOARD_COLUMNS: &str = "id, username, num_ideas, num_followers, \
     avg_return, avg_return_percentile, \
     avg_price_target_capture, avg_price_target_capture_percentile, \
     success_rate, success_rate_percentile, \
     avg_holding_period, avg_holding_period_percentile, \
     analyst_rank, analyst_rank_percentile";

fn entry_from_row(row: LeaderboardRow) -> LeaderboardEntry {
    let (
        id,
        username,
        num_ideas,
        num_followers,
        avg_return,
        avg_return_percentile,
        avg_price_target_capture,
        avg_price_target_capture_percentile,
        success_rate,
        success_rate_percentile,
        avg_holding_period_days,
        avg_holding_period_percentile,
        analyst_rank,
        analyst_rank_percentile,
    ) = row;

    LeaderboardEntry {
        username,
        num_ideas,
        num_followers,
        performance: AnalystPerformance {
            analyst_id: id,
            avg_return,
            avg_return_percentile,
            avg_price_target_capture,
            avg_price_target_capture_percentile,
            success_rate,
            success_rate_percentile,
            avg_holding_period_days,
            avg_holding_period_percentile,
            analyst_rank,
            analyst_rank_percentile,
        },
    }
}

pub async fn fetch_leaderboard(
    pool: &sqlx::PgPool,
    query: &LeaderboardQuery,
) -> anyhow::Result<Vec<LeaderboardEntry>> {
    // ORDER BY is assembled from the whitelisted enums above only.
    let sql = format!(
        "SELECT {LEADERBOARD_COLUMNS} FROM users \
         WHERE is_analyst \
         ORDER BY {} \
         LIMIT $1 OFFSET $2",
        query.order_by()
    );

    let rows = sqlx::query_as::<_, LeaderboardRow>(&sql)
        .persistent(false)
        .bind(i64::from(query.page_size))
        .bind(query.offset())
        .fetch_all(pool)
        .await
        .context("select leaderboard failed")?;

    Ok(rows.into_iter().map(entry_from_row).collect())
}

pub async fn fetch_analyst(
    pool: &sqlx::PgPool,
    analyst_id: i64,
) -> anyhow::Result<Option<LeaderboardEntry>> {
    let sql = format!("SELECT {LEADERBOARD_COLUMNS} FROM users WHERE id = $1 AND is_analyst");
    let row = sqlx::query_as::<_, LeaderboardRow>(&sql)
        .persistent(false)
        .bind(analyst_id)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("select analyst failed (id={analyst_id})"))?;

    Ok(row.map(entry_from_row))
}
