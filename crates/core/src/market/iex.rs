use crate::config::Settings;
use crate::market::error::QuoteError;
use crate::market::{Quote, QuoteSource};
use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::{Duration, Instant};

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_REQ_DELAY_MS: u64 = 0;

/// Quote client for IEX-style `/v1/stock/{symbol}/quote` endpoints.
///
/// Each call is a single attempt. A failed symbol is reported to the caller
/// rather than retried, so one run never hammers a provider that is down.
#[derive(Debug)]
pub struct IexQuoteClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    req_delay: Duration,
    last_request: tokio::sync::Mutex<Option<Instant>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IexQuote {
    symbol: Option<String>,
    latest_price: Option<f64>,
}

impl IexQuoteClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.require_market_data_base_url()?.to_string();
        let api_key = settings.require_market_data_api_key()?.to_string();

        let timeout_secs = std::env::var("MARKET_DATA_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let req_delay_ms = std::env::var("MARKET_DATA_REQ_DELAY_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_REQ_DELAY_MS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build market data http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
            req_delay: Duration::from_millis(req_delay_ms),
            last_request: tokio::sync::Mutex::new(None),
        })
    }

    fn url(&self, symbol: &str) -> String {
        format!(
            "{}/v1/stock/{}/quote",
            self.base_url.trim_end_matches('/'),
            symbol
        )
    }

    async fn throttle(&self) {
        if self.req_delay.is_zero() {
            return;
        }

        let mut guard = self.last_request.lock().await;
        if let Some(prev) = *guard {
            let elapsed = prev.elapsed();
            if elapsed < self.req_delay {
                tokio::time::sleep(self.req_delay - elapsed).await;
            }
        }
        *guard = Some(Instant::now());
    }
}

#[async_trait::async_trait]
impl QuoteSource for IexQuoteClient {
    fn source_name(&self) -> &'static str {
        "iex"
    }

    async fn latest_quote(&self, symbol: &str) -> Result<Quote> {
        let symbol = normalize_symbol(symbol)?;
        self.throttle().await;

        let res = self
            .http
            .get(self.url(&symbol))
            .query(&[("token", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| QuoteError::new(&symbol, "http", e.to_string()))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|e| QuoteError::new(&symbol, "read", e.to_string()))?;

        Ok(parse_quote(&symbol, status, &text)?)
    }
}

fn normalize_symbol(symbol: &str) -> Result<String, QuoteError> {
    let s = symbol.trim().to_ascii_uppercase();
    let valid = !s.is_empty()
        && s.len() <= 10
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    if !valid {
        return Err(QuoteError::new(symbol, "request", "invalid ticker symbol"));
    }
    Ok(s)
}

fn parse_quote(symbol: &str, status: StatusCode, text: &str) -> Result<Quote, QuoteError> {
    if !status.is_success() {
        return Err(QuoteError {
            raw_body: Some(text.to_string()),
            ..QuoteError::new(symbol, "http", format!("status={status}"))
        });
    }

    let parsed = serde_json::from_str::<IexQuote>(text).map_err(|e| QuoteError {
        raw_body: Some(text.to_string()),
        ..QuoteError::new(symbol, "decode", e.to_string())
    })?;

    let latest_price = parsed
        .latest_price
        .ok_or_else(|| QuoteError::new(symbol, "validate", "latestPrice missing"))?;
    if !(latest_price.is_finite() && latest_price > 0.0) {
        return Err(QuoteError::new(
            symbol,
            "validate",
            format!("latestPrice must be positive (got {latest_price})"),
        ));
    }

    Ok(Quote {
        symbol: parsed.symbol.unwrap_or_else(|| symbol.to_string()),
        latest_price,
    })
}
