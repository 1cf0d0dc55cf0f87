use std::fmt;

/// A market-data lookup that did not produce a usable price.
#[derive(Debug, Clone)]
pub struct QuoteError {
    pub symbol: String,
    pub stage: &'static str,
    pub detail: String,
    pub raw_body: Option<String>,
}

impl QuoteError {
    pub fn new(symbol: &str, stage: &'static str, detail: impl Into<String>) -> Self {
        Self {
            symbol: symbol.to_string(),
            stage,
            detail: detail.into(),
            raw_body: None,
        }
    }
}

impl fmt::Display for QuoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "quote error (symbol={}, stage={}): {}",
            self.symbol, self.stage, self.detail
        )
    }
}

impl std::error::Error for QuoteError {}
