pub mod error;
pub mod iex;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub latest_price: f64,
}

#[async_trait::async_trait]
pub trait QuoteSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    /// Latest traded price for `symbol`. Failures should carry a
    /// [`error::QuoteError`] so callers can tell them apart from storage errors.
    async fn latest_quote(&self, symbol: &str) -> anyhow::Result<Quote>;
}
