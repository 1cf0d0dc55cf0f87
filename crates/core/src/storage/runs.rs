use crate::performance::engine::RunReport;
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    /// Ranked, but some quotes failed and those ideas kept stale prices.
    Partial,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunRecord {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub as_of_date: NaiveDate,
    pub trigger: &'static str,
    pub status: RunStatus,
    pub ideas_refreshed: i32,
    pub quote_failures: i32,
    pub analysts_ranked: i32,
    pub error: Option<String>,
    pub details: Option<Value>,
}

impl RunRecord {
    pub fn from_outcome(
        trigger: &'static str,
        started_at: DateTime<Utc>,
        as_of_date: NaiveDate,
        outcome: &anyhow::Result<RunReport>,
    ) -> Self {
        let mut record = Self {
            started_at,
            finished_at: Utc::now(),
            as_of_date,
            trigger,
            status: RunStatus::Error,
            ideas_refreshed: 0,
            quote_failures: 0,
            analysts_ranked: 0,
            error: None,
            details: None,
        };

        match outcome {
            Ok(report) => {
                let refreshed = report
                    .price_refresh
                    .as_ref()
                    .map(|r| r.ideas_refreshed)
                    .unwrap_or(0);
                record.ideas_refreshed = clamp_i32(refreshed);
                record.quote_failures = clamp_i32(report.quote_failures());
                record.analysts_ranked = clamp_i32(report.analysts_ranked);
                record.status = if report.quote_failures() == 0 {
                    RunStatus::Success
                } else {
                    RunStatus::Partial
                };
                record.details = report
                    .price_refresh
                    .as_ref()
                    .filter(|r| !r.failures.is_empty())
                    .and_then(|r| serde_json::to_value(&r.failures).ok());
            }
            Err(err) => {
                record.error = Some(format!("{err:#}"));
            }
        }

        record
    }
}

fn clamp_i32(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

pub async fn record_performance_run(pool: &sqlx::PgPool, record: &RunRecord) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO performance_runs (id, started_at, finished_at, as_of_date, trigger, status, \
           ideas_refreshed, quote_failures, analysts_ranked, error, details) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .persistent(false)
    .bind(id)
    .bind(record.started_at)
    .bind(record.finished_at)
    .bind(record.as_of_date)
    .bind(record.trigger)
    .bind(record.status.as_str())
    .bind(record.ideas_refreshed)
    .bind(record.quote_failures)
    .bind(record.analysts_ranked)
    .bind(record.error.as_deref())
    .bind(record.details.clone())
    .execute(pool)
    .await
    .context("insert performance_runs failed")?;

    Ok(id)
}
