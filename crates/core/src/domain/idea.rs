use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionType {
    Long,
    Short,
}

impl PositionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Short => "short",
        }
    }
}

impl fmt::Display for PositionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PositionType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "long" => Ok(Self::Long),
            "short" => Ok(Self::Short),
            other => bail!("unknown position type: {other:?}"),
        }
    }
}

/// An analyst's directional thesis on a single ticker.
///
/// `last_price` tracks the market while `closed_date` is unset. Once the idea
/// is closed the stored price is the final outcome and is never refreshed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Idea {
    pub id: i64,
    pub analyst_id: i64,
    pub symbol: String,
    pub position_type: PositionType,
    pub entry_price: f64,
    pub price_target: f64,
    pub last_price: f64,
    pub created_at: DateTime<Utc>,
    pub closed_date: Option<DateTime<Utc>>,
}

impl Idea {
    pub fn is_open(&self) -> bool {
        self.closed_date.is_none()
    }
}
