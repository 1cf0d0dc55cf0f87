/// Weight of the price-target-capture percentile in the composite score.
/// Realized return carries weight 1.
pub const CAPTURE_WEIGHT: f64 = 0.5;

/// Fractional ("average") ranks, 1-based, ascending: the largest value gets
/// rank `n`. Tied values share the mean of the ordinal positions they span.
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }

        // Ordinal positions start+1..=end averaged.
        let rank = (start + 1 + end) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = rank;
        }
        start = end;
    }

    ranks
}

/// Average rank divided by population size. Empty input yields an empty
/// output; values land in (0, 1].
pub fn percentiles(values: &[f64]) -> Vec<f64> {
    let n = values.len() as f64;
    average_ranks(values).into_iter().map(|r| r / n).collect()
}

pub fn composite_score(avg_return_percentile: f64, capture_percentile: f64) -> f64 {
    avg_return_percentile + CAPTURE_WEIGHT * capture_percentile
}

/// Composite scores scaled by population size, built from average ranks
/// instead of percentiles. Ranks are multiples of 0.5, so every key is an
/// exact multiple of 0.25 and equal composites compare equal. Ordering and
/// average ranks of the keys match those of the percentile composite.
pub fn composite_keys(avg_returns: &[f64], captures: &[f64]) -> Vec<f64> {
    debug_assert_eq!(avg_returns.len(), captures.len());

    average_ranks(avg_returns)
        .into_iter()
        .zip(average_ranks(captures))
        .map(|(r, c)| composite_score(r, c))
        .collect()
}

/// 1-based ranks by descending score; equal scores fall back to ascending
/// `ids` so the ordering is stable across runs.
pub fn ordinal_ranks_desc(scores: &[f64], ids: &[i64]) -> Vec<i32> {
    debug_assert_eq!(scores.len(), ids.len());

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .total_cmp(&scores[a])
            .then_with(|| ids[a].cmp(&ids[b]))
    });

    let mut ranks = vec![0; scores.len()];
    for (position, idx) in order.into_iter().enumerate() {
        ranks[idx] = position as i32 + 1;
    }
    ranks
}
