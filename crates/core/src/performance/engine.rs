use crate::domain::analyst::AnalystPerformance;
use crate::domain::idea::Idea;
use crate::market::error::QuoteError;
use crate::market::QuoteSource;
use crate::performance::metrics::{aggregate_ideas, IdeaAggregate};
use crate::performance::ranking::{composite_keys, ordinal_ranks_desc, percentiles};
use crate::performance::{AnalystStore, IdeaStore};
use anyhow::Context;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteFailure {
    pub idea_id: i64,
    pub symbol: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceRefreshReport {
    pub ideas_refreshed: usize,
    pub closed_skipped: usize,
    pub failures: Vec<QuoteFailure>,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Reference date for holding periods of open ideas.
    pub as_of: NaiveDate,
    pub refresh_prices: bool,
    /// Abort before ranking when any quote lookup failed.
    pub fail_on_quote_error: bool,
}

impl RunOptions {
    pub fn new(as_of: NaiveDate) -> Self {
        Self {
            as_of,
            refresh_prices: true,
            fail_on_quote_error: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub as_of: NaiveDate,
    pub price_refresh: Option<PriceRefreshReport>,
    pub analysts_ranked: usize,
    pub rankings: Vec<AnalystPerformance>,
}

impl RunReport {
    pub fn quote_failures(&self) -> usize {
        self.price_refresh
            .as_ref()
            .map(|r| r.failures.len())
            .unwrap_or(0)
    }
}

/// Batch recomputation of analyst performance and ranks.
///
/// Not safe to run concurrently with itself; callers serialize runs.
pub struct PerformanceEngine<'a> {
    ideas: &'a dyn IdeaStore,
    analysts: &'a dyn AnalystStore,
    quotes: &'a dyn QuoteSource,
}

impl<'a> PerformanceEngine<'a> {
    pub fn new(
        ideas: &'a dyn IdeaStore,
        analysts: &'a dyn AnalystStore,
        quotes: &'a dyn QuoteSource,
    ) -> Self {
        Self {
            ideas,
            analysts,
            quotes,
        }
    }

    pub async fn run(&self, opts: &RunOptions) -> anyhow::Result<RunReport> {
        let price_refresh = if opts.refresh_prices {
            let report = self.refresh_prices().await?;
            if opts.fail_on_quote_error && !report.failures.is_empty() {
                anyhow::bail!(
                    "{} quote lookups failed; ranking skipped",
                    report.failures.len()
                );
            }
            Some(report)
        } else {
            None
        };

        let (rankings, unranked) = self.collect_rankings(opts.as_of).await?;
        if rankings.is_empty() && unranked.is_empty() {
            tracing::info!(as_of = %opts.as_of, "no analysts with ideas; nothing to rank");
        } else {
            self.analysts
                .save_performance(&rankings, &unranked)
                .await
                .context("persist analyst performance failed")?;
        }

        tracing::info!(
            as_of = %opts.as_of,
            analysts_ranked = rankings.len(),
            quote_failures = price_refresh.as_ref().map(|r| r.failures.len()).unwrap_or(0),
            "performance run complete"
        );

        Ok(RunReport {
            as_of: opts.as_of,
            price_refresh,
            analysts_ranked: rankings.len(),
            rankings,
        })
    }

    /// Pulls a fresh quote for every open idea. Closed ideas keep the price
    /// they were closed at. A failed lookup leaves that idea's price as is and
    /// is reported, not retried.
    pub async fn refresh_prices(&self) -> anyhow::Result<PriceRefreshReport> {
        let ideas = self.ideas.list_ideas().await.context("list ideas failed")?;

        let mut report = PriceRefreshReport::default();
        let mut by_symbol: BTreeMap<String, Vec<&Idea>> = BTreeMap::new();
        for idea in &ideas {
            if idea.is_open() {
                by_symbol
                    .entry(idea.symbol.trim().to_ascii_uppercase())
                    .or_default()
                    .push(idea);
            } else {
                report.closed_skipped += 1;
            }
        }

        let source = self.quotes.source_name();
        for (symbol, open_ideas) in by_symbol {
            let quote = match self.quotes.latest_quote(&symbol).await {
                Ok(q) => q,
                Err(err) => {
                    tracing::warn!(
                        %symbol,
                        source,
                        ideas = open_ideas.len(),
                        error = %err,
                        "quote lookup failed; keeping stored price"
                    );
                    for idea in open_ideas {
                        report.failures.push(QuoteFailure {
                            idea_id: idea.id,
                            symbol: symbol.clone(),
                            error: format!("{err:#}"),
                        });
                    }
                    continue;
                }
            };

            if !(quote.latest_price.is_finite() && quote.latest_price > 0.0) {
                let err = QuoteError::new(
                    &symbol,
                    "validate",
                    format!("unusable price {}", quote.latest_price),
                );
                tracing::warn!(
                    %symbol,
                    source,
                    ideas = open_ideas.len(),
                    error = %err,
                    "quote rejected; keeping stored price"
                );
                for idea in open_ideas {
                    report.failures.push(QuoteFailure {
                        idea_id: idea.id,
                        symbol: symbol.clone(),
                        error: err.to_string(),
                    });
                }
                continue;
            }

            for idea in open_ideas {
                self.ideas
                    .update_last_price(idea.id, quote.latest_price)
                    .await
                    .with_context(|| format!("update last_price failed (idea_id={})", idea.id))?;
                report.ideas_refreshed += 1;
            }
        }

        tracing::info!(
            ideas_refreshed = report.ideas_refreshed,
            closed_skipped = report.closed_skipped,
            failures = report.failures.len(),
            "price refresh done"
        );

        Ok(report)
    }

    /// Reads every active analyst's ideas and returns their normalized
    /// performance, best rank first. Writes nothing.
    pub async fn compute_rankings(
        &self,
        as_of: NaiveDate,
    ) -> anyhow::Result<Vec<AnalystPerformance>> {
        Ok(self.collect_rankings(as_of).await?.0)
    }

    /// Rankings plus the ids of analysts that could not be ranked this run
    /// and must lose any stale rank.
    async fn collect_rankings(
        &self,
        as_of: NaiveDate,
    ) -> anyhow::Result<(Vec<AnalystPerformance>, Vec<i64>)> {
        let analysts = self
            .analysts
            .list_active_analysts()
            .await
            .context("list analysts failed")?;

        let mut ids: Vec<i64> = Vec::with_capacity(analysts.len());
        let mut aggregates: Vec<IdeaAggregate> = Vec::with_capacity(analysts.len());
        let mut unranked: Vec<i64> = Vec::new();
        for analyst in analysts.iter().filter(|a| a.num_ideas > 0) {
            let ideas = self
                .analysts
                .ideas_for_analyst(analyst.id)
                .await
                .with_context(|| format!("load ideas failed (analyst_id={})", analyst.id))?;

            let Some(agg) = aggregate_ideas(&ideas, as_of) else {
                tracing::warn!(
                    analyst_id = analyst.id,
                    num_ideas = analyst.num_ideas,
                    "analyst has an idea count but no ideas; clearing rank"
                );
                unranked.push(analyst.id);
                continue;
            };
            ids.push(analyst.id);
            aggregates.push(agg);
        }

        Ok((rank_aggregates(&ids, &aggregates), unranked))
    }
}

fn rank_aggregates(ids: &[i64], aggregates: &[IdeaAggregate]) -> Vec<AnalystPerformance> {
    if aggregates.is_empty() {
        return Vec::new();
    }

    let column = |f: fn(&IdeaAggregate) -> f64| -> Vec<f64> { aggregates.iter().map(f).collect() };
    let returns = column(|a| a.avg_return);
    let captures = column(|a| a.avg_price_target_capture);
    let return_p = percentiles(&returns);
    let capture_p = percentiles(&captures);
    let success_p = percentiles(&column(|a| a.success_rate));
    let holding_p = percentiles(&column(|a| a.avg_holding_period_days));

    let composites = composite_keys(&returns, &captures);
    let ranks = ordinal_ranks_desc(&composites, ids);
    let rank_p = percentiles(&composites);

    let mut out: Vec<AnalystPerformance> = (0..aggregates.len())
        .map(|i| AnalystPerformance {
            analyst_id: ids[i],
            avg_return: aggregates[i].avg_return,
            avg_return_percentile: return_p[i],
            avg_price_target_capture: aggregates[i].avg_price_target_capture,
            avg_price_target_capture_percentile: capture_p[i],
            success_rate: aggregates[i].success_rate,
            success_rate_percentile: success_p[i],
            avg_holding_period_days: aggregates[i].avg_holding_period_days,
            avg_holding_period_percentile: holding_p[i],
            analyst_rank: ranks[i],
            analyst_rank_percentile: rank_p[i],
        })
        .collect();
    out.sort_by_key(|p| p.analyst_rank);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::analyst::Analyst;
    use crate::domain::idea::PositionType;
    use crate::market::error::QuoteError;
    use crate::market::Quote;
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        analysts: Vec<Analyst>,
        ideas: Mutex<Vec<Idea>>,
        price_writes: Mutex<Vec<(i64, f64)>>,
        saved: Mutex<Vec<Vec<AnalystPerformance>>>,
        cleared: Mutex<Vec<i64>>,
    }

    impl MemoryStore {
        fn price_of(&self, idea_id: i64) -> f64 {
            let ideas = self.ideas.lock().unwrap();
            ideas.iter().find(|i| i.id == idea_id).unwrap().last_price
        }

        fn last_saved(&self) -> Vec<AnalystPerformance> {
            self.saved.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait::async_trait]
    impl IdeaStore for MemoryStore {
        async fn list_ideas(&self) -> anyhow::Result<Vec<Idea>> {
            Ok(self.ideas.lock().unwrap().clone())
        }

        async fn update_last_price(&self, idea_id: i64, last_price: f64) -> anyhow::Result<()> {
            let mut ideas = self.ideas.lock().unwrap();
            let idea = ideas
                .iter_mut()
                .find(|i| i.id == idea_id)
                .ok_or_else(|| anyhow::anyhow!("no idea {idea_id}"))?;
            idea.last_price = last_price;
            self.price_writes.lock().unwrap().push((idea_id, last_price));
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl AnalystStore for MemoryStore {
        async fn list_active_analysts(&self) -> anyhow::Result<Vec<Analyst>> {
            Ok(self.analysts.clone())
        }

        async fn ideas_for_analyst(&self, analyst_id: i64) -> anyhow::Result<Vec<Idea>> {
            let ideas = self.ideas.lock().unwrap();
            Ok(ideas
                .iter()
                .filter(|i| i.analyst_id == analyst_id)
                .cloned()
                .collect())
        }

        async fn save_performance(
            &self,
            rows: &[AnalystPerformance],
            unranked: &[i64],
        ) -> anyhow::Result<()> {
            self.saved.lock().unwrap().push(rows.to_vec());
            self.cleared.lock().unwrap().extend_from_slice(unranked);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FixedQuotes {
        prices: HashMap<String, f64>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl QuoteSource for FixedQuotes {
        fn source_name(&self) -> &'static str {
            "fixed"
        }

        async fn latest_quote(&self, symbol: &str) -> anyhow::Result<Quote> {
            self.calls.lock().unwrap().push(symbol.to_string());
            let latest_price = self
                .prices
                .get(symbol)
                .copied()
                .ok_or_else(|| QuoteError::new(symbol, "http", "status=404 Not Found"))?;
            Ok(Quote {
                symbol: symbol.to_string(),
                latest_price,
            })
        }
    }

    fn ts(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 15, 0, 0).unwrap()
    }

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    fn analyst(id: i64, num_ideas: i32) -> Analyst {
        Analyst {
            id,
            username: format!("analyst{id}"),
            num_ideas,
        }
    }

    fn long(id: i64, analyst_id: i64, symbol: &str, entry: f64, target: f64, last: f64) -> Idea {
        Idea {
            id,
            analyst_id,
            symbol: symbol.to_string(),
            position_type: PositionType::Long,
            entry_price: entry,
            price_target: target,
            last_price: last,
            created_at: ts(2026, 1, 1),
            closed_date: None,
        }
    }

    fn quotes(pairs: &[(&str, f64)]) -> FixedQuotes {
        FixedQuotes {
            prices: pairs.iter().map(|(s, p)| (s.to_string(), *p)).collect(),
            ..Default::default()
        }
    }

    fn no_refresh() -> RunOptions {
        RunOptions {
            refresh_prices: false,
            ..RunOptions::new(as_of())
        }
    }

    #[tokio::test]
    async fn refresh_updates_open_ideas_and_freezes_closed_ones() {
        let mut closed = long(2, 1, "AAPL", 300.0, 400.0, 340.0);
        closed.closed_date = Some(ts(2026, 2, 20));
        let store = MemoryStore {
            analysts: vec![analyst(1, 3)],
            ideas: Mutex::new(vec![
                long(1, 1, "AAPL", 300.0, 400.0, 310.0),
                closed,
                long(3, 1, "aapl", 280.0, 350.0, 300.0),
            ]),
            ..Default::default()
        };
        let q = quotes(&[("AAPL", 355.0)]);
        let engine = PerformanceEngine::new(&store, &store, &q);

        let report = engine.refresh_prices().await.unwrap();

        assert_eq!(report.ideas_refreshed, 2);
        assert_eq!(report.closed_skipped, 1);
        assert!(report.failures.is_empty());
        assert_eq!(store.price_of(1), 355.0);
        assert_eq!(store.price_of(2), 340.0);
        assert_eq!(store.price_of(3), 355.0);
        assert_eq!(*q.calls.lock().unwrap(), vec!["AAPL".to_string()]);
    }

    #[tokio::test]
    async fn failed_quote_keeps_price_and_is_reported() {
        let store = MemoryStore {
            analysts: vec![analyst(1, 2)],
            ideas: Mutex::new(vec![
                long(1, 1, "AAPL", 100.0, 150.0, 110.0),
                long(2, 1, "GONE", 50.0, 60.0, 55.0),
            ]),
            ..Default::default()
        };
        let q = quotes(&[("AAPL", 120.0)]);
        let engine = PerformanceEngine::new(&store, &store, &q);

        let report = engine.run(&RunOptions::new(as_of())).await.unwrap();

        let refresh = report.price_refresh.as_ref().unwrap();
        assert_eq!(refresh.ideas_refreshed, 1);
        assert_eq!(refresh.failures.len(), 1);
        assert_eq!(refresh.failures[0].idea_id, 2);
        assert_eq!(refresh.failures[0].symbol, "GONE");
        assert!(refresh.failures[0].error.contains("GONE"));
        assert_eq!(store.price_of(2), 55.0);
        assert_eq!(report.quote_failures(), 1);
        // Ranking still proceeds on the stored prices.
        assert_eq!(report.analysts_ranked, 1);
    }

    #[tokio::test]
    async fn fail_on_quote_error_aborts_before_ranking() {
        let store = MemoryStore {
            analysts: vec![analyst(1, 1)],
            ideas: Mutex::new(vec![long(1, 1, "GONE", 50.0, 60.0, 55.0)]),
            ..Default::default()
        };
        let q = quotes(&[]);
        let engine = PerformanceEngine::new(&store, &store, &q);

        let opts = RunOptions {
            fail_on_quote_error: true,
            ..RunOptions::new(as_of())
        };
        assert!(engine.run(&opts).await.is_err());
        assert!(store.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn analysts_without_ideas_are_left_out() {
        let store = MemoryStore {
            analysts: vec![analyst(1, 1), analyst(2, 0), analyst(3, 1)],
            ideas: Mutex::new(vec![
                long(1, 1, "AAPL", 100.0, 150.0, 120.0),
                long(2, 3, "MSFT", 100.0, 150.0, 90.0),
            ]),
            ..Default::default()
        };
        let q = quotes(&[]);
        let engine = PerformanceEngine::new(&store, &store, &q);

        let report = engine.run(&no_refresh()).await.unwrap();

        let saved = store.last_saved();
        let ids: Vec<i64> = saved.iter().map(|p| p.analyst_id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(report.analysts_ranked, 2);
        assert!(store.price_writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn idea_count_without_rows_is_skipped() {
        let store = MemoryStore {
            analysts: vec![analyst(1, 1), analyst(2, 4)],
            ideas: Mutex::new(vec![long(1, 1, "AAPL", 100.0, 150.0, 120.0)]),
            ..Default::default()
        };
        let q = quotes(&[]);
        let engine = PerformanceEngine::new(&store, &store, &q);

        let rankings = engine.compute_rankings(as_of()).await.unwrap();
        assert_eq!(rankings.len(), 1);
        assert_eq!(rankings[0].analyst_id, 1);
        assert_eq!(rankings[0].analyst_rank, 1);
        assert_eq!(rankings[0].analyst_rank_percentile, 1.0);

        engine.run(&no_refresh()).await.unwrap();
        assert_eq!(*store.cleared.lock().unwrap(), vec![2]);
        assert_eq!(store.last_saved().len(), 1);
    }

    #[tokio::test]
    async fn unusable_quote_is_a_failure_not_a_write() {
        let store = MemoryStore {
            analysts: vec![analyst(1, 2)],
            ideas: Mutex::new(vec![
                long(1, 1, "AAPL", 100.0, 150.0, 110.0),
                long(2, 1, "MSFT", 200.0, 250.0, 210.0),
            ]),
            ..Default::default()
        };
        let q = quotes(&[("AAPL", 0.0), ("MSFT", f64::NAN)]);
        let engine = PerformanceEngine::new(&store, &store, &q);

        let report = engine.refresh_prices().await.unwrap();

        assert_eq!(report.ideas_refreshed, 0);
        assert_eq!(report.failures.len(), 2);
        assert!(report.failures[0].error.contains("stage=validate"));
        assert_eq!(store.price_of(1), 110.0);
        assert_eq!(store.price_of(2), 210.0);
        assert!(store.price_writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn tied_returns_share_percentile() {
        // Returns 0.10, 0.10, 0.30.
        let store = MemoryStore {
            analysts: vec![analyst(1, 1), analyst(2, 1), analyst(3, 1)],
            ideas: Mutex::new(vec![
                long(1, 1, "AAPL", 100.0, 200.0, 110.0),
                long(2, 2, "MSFT", 100.0, 200.0, 110.0),
                long(3, 3, "NVDA", 100.0, 200.0, 130.0),
            ]),
            ..Default::default()
        };
        let q = quotes(&[]);
        let engine = PerformanceEngine::new(&store, &store, &q);

        let rankings = engine.compute_rankings(as_of()).await.unwrap();
        let by_id: HashMap<i64, &AnalystPerformance> =
            rankings.iter().map(|p| (p.analyst_id, p)).collect();

        assert_eq!(by_id[&1].avg_return_percentile, 0.5);
        assert_eq!(by_id[&2].avg_return_percentile, 0.5);
        assert_eq!(by_id[&3].avg_return_percentile, 1.0);
        assert_eq!(by_id[&3].analyst_rank, 1);
        assert_eq!(by_id[&1].analyst_rank, 2);
        assert_eq!(by_id[&2].analyst_rank, 3);
    }

    #[tokio::test]
    async fn rank_follows_weighted_return_and_capture() {
        // Analyst 1: higher return, lower capture. Analyst 2: the reverse.
        // Return outweighs capture 2:1, so analyst 1 wins.
        let store = MemoryStore {
            analysts: vec![analyst(1, 1), analyst(2, 1)],
            ideas: Mutex::new(vec![
                long(1, 1, "AAPL", 100.0, 300.0, 150.0),
                long(2, 2, "MSFT", 100.0, 120.0, 120.0),
            ]),
            ..Default::default()
        };
        let q = quotes(&[]);
        let engine = PerformanceEngine::new(&store, &store, &q);

        let rankings = engine.compute_rankings(as_of()).await.unwrap();
        assert_eq!(rankings[0].analyst_id, 1);
        assert_eq!(rankings[0].avg_return_percentile, 1.0);
        assert_eq!(rankings[0].avg_price_target_capture_percentile, 0.5);
        assert_eq!(rankings[1].analyst_id, 2);
        assert_eq!(rankings[1].avg_price_target_capture_percentile, 1.0);
        assert_eq!(rankings[0].analyst_rank_percentile, 1.0);
        assert_eq!(rankings[1].analyst_rank_percentile, 0.5);

        // Move analyst 2's price past analyst 1's return: the order flips.
        store.ideas.lock().unwrap()[1].last_price = 170.0;
        let rankings = engine.compute_rankings(as_of()).await.unwrap();
        assert_eq!(rankings[0].analyst_id, 2);
        assert_eq!(rankings[0].analyst_rank, 1);
    }

    #[tokio::test]
    async fn back_to_back_runs_are_identical() {
        let mut closed = long(3, 2, "TSLA", 200.0, 150.0, 180.0);
        closed.position_type = PositionType::Short;
        closed.closed_date = Some(ts(2026, 2, 1));
        let store = MemoryStore {
            analysts: vec![analyst(1, 2), analyst(2, 1)],
            ideas: Mutex::new(vec![
                long(1, 1, "AAPL", 100.0, 150.0, 120.0),
                long(2, 1, "MSFT", 300.0, 330.0, 290.0),
                closed,
            ]),
            ..Default::default()
        };
        let q = quotes(&[("AAPL", 125.0), ("MSFT", 295.0)]);
        let engine = PerformanceEngine::new(&store, &store, &q);

        let first = engine.run(&RunOptions::new(as_of())).await.unwrap();
        let second = engine.run(&RunOptions::new(as_of())).await.unwrap();

        assert_eq!(first.rankings, second.rankings);
        let saved = store.saved.lock().unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0], saved[1]);
    }

    #[tokio::test]
    async fn empty_population_writes_nothing() {
        let store = MemoryStore {
            analysts: vec![analyst(1, 0)],
            ..Default::default()
        };
        let q = quotes(&[]);
        let engine = PerformanceEngine::new(&store, &store, &q);

        let report = engine.run(&no_refresh()).await.unwrap();
        assert_eq!(report.analysts_ranked, 0);
        assert!(store.saved.lock().unwrap().is_empty());
    }

    #[test]
    fn percentiles_stay_in_unit_interval() {
        let ids = [1, 2, 3, 4];
        let aggs: Vec<IdeaAggregate> = [(-0.2, 0.0), (0.1, 0.3), (0.1, 0.3), (0.4, 1.0)]
            .iter()
            .map(|&(r, c)| IdeaAggregate {
                avg_return: r,
                avg_price_target_capture: c,
                success_rate: if r > 0.0 { 1.0 } else { 0.0 },
                avg_holding_period_days: 30.0,
            })
            .collect();

        let rows = rank_aggregates(&ids, &aggs);
        for p in &rows {
            for v in [
                p.avg_return_percentile,
                p.avg_price_target_capture_percentile,
                p.success_rate_percentile,
                p.avg_holding_period_percentile,
                p.analyst_rank_percentile,
            ] {
                assert!(v > 0.0 && v <= 1.0, "{v}");
            }
        }
        let ranks: Vec<i32> = rows.iter().map(|p| p.analyst_rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
        assert_eq!(rows[0].analyst_id, 4);
        assert_eq!(rows[1].analyst_id, 2);
        assert_eq!(rows[3].analyst_id, 1);
    }

    #[test]
    fn equal_composites_tie_break_on_id_and_share_percentile() {
        // Analysts 2 and 3 both land on a composite of 7/6.
        let ids = [1, 2, 3];
        let aggs: Vec<IdeaAggregate> = [(0.0, 0.1), (0.1, 0.2), (0.2, 0.0)]
            .iter()
            .map(|&(r, c)| IdeaAggregate {
                avg_return: r,
                avg_price_target_capture: c,
                success_rate: 0.5,
                avg_holding_period_days: 10.0,
            })
            .collect();

        let rows = rank_aggregates(&ids, &aggs);
        let order: Vec<(i64, i32)> = rows.iter().map(|p| (p.analyst_id, p.analyst_rank)).collect();
        assert_eq!(order, vec![(2, 1), (3, 2), (1, 3)]);
        assert_eq!(rows[0].analyst_rank_percentile, 2.5 / 3.0);
        assert_eq!(rows[1].analyst_rank_percentile, 2.5 / 3.0);
        assert_eq!(rows[2].analyst_rank_percentile, 1.0 / 3.0);
    }
}
