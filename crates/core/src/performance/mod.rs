pub mod engine;
pub mod metrics;
pub mod ranking;

use crate::domain::analyst::{Analyst, AnalystPerformance};
use crate::domain::idea::Idea;

#[async_trait::async_trait]
pub trait IdeaStore: Send + Sync {
    async fn list_ideas(&self) -> anyhow::Result<Vec<Idea>>;

    async fn update_last_price(&self, idea_id: i64, last_price: f64) -> anyhow::Result<()>;
}

#[async_trait::async_trait]
pub trait AnalystStore: Send + Sync {
    /// Analysts with at least one posted idea.
    async fn list_active_analysts(&self) -> anyhow::Result<Vec<Analyst>>;

    async fn ideas_for_analyst(&self, analyst_id: i64) -> anyhow::Result<Vec<Idea>>;

    /// Writes every performance field for each row and resets the rank of
    /// each `unranked` analyst to 0, all-or-nothing.
    async fn save_performance(
        &self,
        rows: &[AnalystPerformance],
        unranked: &[i64],
    ) -> anyhow::Result<()>;
}
