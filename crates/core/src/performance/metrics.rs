use crate::domain::idea::{Idea, PositionType};
use chrono::NaiveDate;

/// Fractional move from `from` to `to`, signed so that a favorable move for
/// `position` is positive. Degenerate prices yield 0.
fn directional_move(position: PositionType, from: f64, to: f64) -> f64 {
    if !(from > 0.0 && from.is_finite() && to > 0.0 && to.is_finite()) {
        return 0.0;
    }

    match position {
        PositionType::Long => to / from - 1.0,
        PositionType::Short => 1.0 - to / from,
    }
}

pub fn idea_return(idea: &Idea) -> f64 {
    directional_move(idea.position_type, idea.entry_price, idea.last_price)
}

/// Whole UTC calendar days from creation to close, or to `as_of` while open.
pub fn holding_period_days(idea: &Idea, as_of: NaiveDate) -> i64 {
    let start = idea.created_at.date_naive();
    let end = idea
        .closed_date
        .map(|d| d.date_naive())
        .unwrap_or(as_of);
    (end - start).num_days().max(0)
}

/// Share of the forecast move that was realized, in [0, 1].
///
/// No credit when the thesis went the wrong way or the target itself implies
/// a loss for the position. Overshooting the target is capped at 1.
pub fn price_target_capture(idea: &Idea) -> f64 {
    let expected_gain =
        directional_move(idea.position_type, idea.entry_price, idea.price_target);
    let actual_gain = idea_return(idea);

    if expected_gain <= 0.0 || actual_gain <= 0.0 {
        return 0.0;
    }

    (actual_gain / expected_gain).min(1.0)
}

pub fn is_profitable(idea: &Idea) -> bool {
    idea_return(idea) > 0.0
}

/// Per-analyst means over the full idea set, before normalization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdeaAggregate {
    pub avg_return: f64,
    pub avg_price_target_capture: f64,
    pub success_rate: f64,
    pub avg_holding_period_days: f64,
}

/// Returns `None` for an empty idea set.
pub fn aggregate_ideas(ideas: &[Idea], as_of: NaiveDate) -> Option<IdeaAggregate> {
    if ideas.is_empty() {
        return None;
    }

    let mut total_return = 0.0;
    let mut total_capture = 0.0;
    let mut profitable = 0.0;
    let mut total_days = 0.0;
    for idea in ideas {
        total_return += idea_return(idea);
        total_capture += price_target_capture(idea);
        if is_profitable(idea) {
            profitable += 1.0;
        }
        total_days += holding_period_days(idea, as_of) as f64;
    }

    let n = ideas.len() as f64;
    Some(IdeaAggregate {
        avg_return: total_return / n,
        avg_price_target_capture: total_capture / n,
        success_rate: profitable / n,
        avg_holding_period_days: total_days / n,
    })
}
