use chrono::NaiveDate;
use ideaboard_core::domain::analyst::AnalystPerformance;

const TOP_N: usize = 10;

pub fn log_rankings(as_of_date: NaiveDate, rankings: &[AnalystPerformance]) {
    tracing::info!(%as_of_date, analysts = rankings.len(), "analyst rankings");

    for p in rankings.iter().take(TOP_N) {
        tracing::info!(
            rank = p.analyst_rank,
            analyst_id = p.analyst_id,
            avg_return = p.avg_return,
            avg_price_target_capture = p.avg_price_target_capture,
            success_rate = p.success_rate,
            avg_holding_period_days = p.avg_holding_period_days,
            rank_percentile = p.analyst_rank_percentile,
            "ranked analyst"
        );
    }

    if tracing::enabled!(tracing::Level::DEBUG) {
        match serde_json::to_string(rankings) {
            Ok(json) => tracing::debug!(%as_of_date, rankings = %json, "full rankings"),
            Err(e) => tracing::debug!(error = %e, "rankings serialize failed"),
        }
    }
}
