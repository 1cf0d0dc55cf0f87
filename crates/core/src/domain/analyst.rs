use serde::{Deserialize, Serialize};

/// A user flagged as analyst, as seen by the ranking engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analyst {
    pub id: i64,
    pub username: String,
    pub num_ideas: i32,
}

/// Every field the ranking engine owns on an analyst row. Written in bulk,
/// never partially.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalystPerformance {
    pub analyst_id: i64,
    pub avg_return: f64,
    pub avg_return_percentile: f64,
    pub avg_price_target_capture: f64,
    pub avg_price_target_capture_percentile: f64,
    pub success_rate: f64,
    pub success_rate_percentile: f64,
    pub avg_holding_period_days: f64,
    pub avg_holding_period_percentile: f64,
    pub analyst_rank: i32,
    pub analyst_rank_percentile: f64,
}

/// Leaderboard row: the stored performance plus display-only counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub username: String,
    pub num_ideas: i32,
    pub num_followers: i32,
    #[serde(flatten)]
    pub performance: AnalystPerformance,
}
