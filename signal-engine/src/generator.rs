//! Run orchestration
//!
//! One `run` walks the whole pipeline: resolve the trading date, narrow the
//! universe with cheap metadata filters, then fan the surviving candidates out
//! over a bounded task set while the Market Gate is evaluated alongside. Any
//! single candidate failure is a skip, never an abort; the caller always gets
//! a ScreenerResult back.

use crate::config::EngineConfig;
use crate::gate::{collect_gate_input, MarketGateClassifier};
use crate::pattern::PatternDetector;
use crate::position::PositionSizer;
use crate::scorer::SignalScorer;
use chrono::{NaiveDate, Utc};
use common::{
    EngineError, GateResult, Grade, InstrumentMeta, Market, ScreenerResult, Signal,
};
use market_data::{IndexId, MarketDataSource, NewsProvider, SentimentScorer};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome of one per-candidate task.
enum Evaluation {
    Scored(Box<Signal>),
    /// Dropped by a per-bar filter (price band, change band, traded value).
    Filtered,
    /// History too short for pattern analysis.
    NotApplicable,
    /// Data fetch failed or timed out.
    Failed,
}

pub struct SignalGenerator {
    inner: Arc<Pipeline>,
    abort: Arc<AtomicBool>,
}

/// Everything a spawned candidate task needs, shared behind one Arc.
struct Pipeline {
    config: EngineConfig,
    source: Arc<dyn MarketDataSource>,
    news: Arc<dyn NewsProvider>,
    gate: MarketGateClassifier,
    detector: PatternDetector,
    scorer: SignalScorer,
    sizer: PositionSizer,
}

impl SignalGenerator {
    /// Fails fast on an invalid configuration; nothing else here can fail.
    pub fn new(
        config: EngineConfig,
        source: Arc<dyn MarketDataSource>,
        news: Arc<dyn NewsProvider>,
        sentiment: Arc<dyn SentimentScorer>,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let news_timeout = Duration::from_secs(config.runtime.news_timeout_secs);
        let inner = Pipeline {
            gate: MarketGateClassifier::new(config.gate.clone()),
            detector: PatternDetector::new(config.pattern.clone()),
            scorer: SignalScorer::new(config.scoring.clone(), sentiment, news_timeout),
            sizer: PositionSizer::new(config.position.clone()),
            config,
            source,
            news,
        };

        Ok(Self {
            inner: Arc::new(inner),
            abort: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Request that the current (or next) run stops dispatching candidates.
    /// Signals already produced are kept. Sticky until [`reset_abort`].
    ///
    /// [`reset_abort`]: SignalGenerator::reset_abort
    pub fn abort(&self) {
        self.abort.store(true, Ordering::Relaxed);
    }

    pub fn reset_abort(&self) {
        self.abort.store(false, Ordering::Relaxed);
    }

    /// Shared handle to the abort flag, for callers driving runs externally.
    pub fn abort_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    /// Execute one full screening run for `as_of`.
    pub async fn run(&self, as_of: NaiveDate) -> ScreenerResult {
        let started = Instant::now();

        let (resolved, stale) = self.resolve_date(as_of).await;
        if stale {
            info!(requested = %as_of, resolved = %resolved, "no session on requested date");
        }

        let candidates = self.collect_candidates().await;
        let total_candidates = candidates.len();

        // The gate shares no state with the scan, so both run at once.
        let (gate, (mut signals, skipped)) =
            tokio::join!(self.evaluate_gate(resolved), self.scan(resolved, candidates));

        // Rank: strongest score first, traded value breaking ties.
        signals.sort_by(|a, b| {
            b.score
                .total
                .cmp(&a.score.total)
                .then_with(|| b.value_traded.total_cmp(&a.value_traded))
        });

        let mut by_grade: BTreeMap<Grade, usize> = BTreeMap::new();
        for signal in &signals {
            *by_grade.entry(signal.grade).or_insert(0) += 1;
        }
        let degraded = signals.iter().filter(|s| s.score.is_degraded()).count();

        let result = ScreenerResult {
            as_of: resolved,
            stale,
            gate,
            total_candidates,
            analyzed: signals.len(),
            skipped,
            degraded,
            by_grade,
            signals,
            processing_time_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            as_of = %result.as_of,
            candidates = result.total_candidates,
            analyzed = result.analyzed,
            skipped = result.skipped,
            degraded = result.degraded,
            elapsed_ms = result.processing_time_ms,
            "run finished"
        );

        result
    }

    /// Resolve the trading session for `as_of` through the KOSPI index.
    /// A failed lookup falls back to the requested date; per-candidate
    /// fetches will then resolve (or fail) on their own.
    async fn resolve_date(&self, as_of: NaiveDate) -> (NaiveDate, bool) {
        match self.inner.source.index_bars(IndexId::Kospi, as_of, 1).await {
            Ok(fetch) => (fetch.resolved_date, fetch.is_closed),
            Err(e) => {
                warn!(error = %e, %as_of, "trading date resolution failed, using requested date");
                (as_of, false)
            }
        }
    }

    /// Cheap metadata filters: market cap floor and excluded name keywords.
    /// Ordered by market cap so truncation keeps the liquid end of the book.
    async fn collect_candidates(&self) -> Vec<InstrumentMeta> {
        let filters = &self.inner.config.filters;
        let mut universe = Vec::new();

        for market in [Market::Kospi, Market::Kosdaq] {
            match self.inner.source.instruments(market).await {
                Ok(metas) => universe.extend(metas),
                Err(e) => warn!(error = %e, %market, "instrument listing failed"),
            }
        }

        universe.retain(|meta| {
            meta.market_cap >= filters.min_market_cap
                && !filters
                    .exclude_keywords
                    .iter()
                    .any(|kw| meta.name.contains(kw.as_str()))
        });
        universe.sort_by(|a, b| b.market_cap.cmp(&a.market_cap));
        universe.truncate(self.inner.config.runtime.max_candidates);

        debug!(candidates = universe.len(), "universe narrowed");
        universe
    }

    async fn evaluate_gate(&self, as_of: NaiveDate) -> Option<GateResult> {
        match collect_gate_input(self.inner.source.as_ref(), as_of, &self.inner.config.gate).await
        {
            Ok(input) => Some(self.inner.gate.evaluate(&input)),
            Err(e) => {
                warn!(error = %e, "gate input collection failed, no gate this run");
                None
            }
        }
    }

    /// Fan candidates out over a semaphore-bounded task set.
    /// Returns the produced signals and the skip count.
    async fn scan(
        &self,
        as_of: NaiveDate,
        candidates: Vec<InstrumentMeta>,
    ) -> (Vec<Signal>, usize) {
        let semaphore = Arc::new(Semaphore::new(self.inner.config.runtime.concurrency));
        let mut tasks = JoinSet::new();
        let mut skipped = 0usize;

        let mut pending = candidates.into_iter();
        for meta in pending.by_ref() {
            if self.abort.load(Ordering::Relaxed) {
                warn!("run aborted, remaining candidates dropped");
                skipped += 1;
                break;
            }

            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let pipeline = Arc::clone(&self.inner);
            tasks.spawn(async move {
                let _permit = permit;
                pipeline.evaluate(meta, as_of).await
            });
        }
        skipped += pending.count();

        let mut signals = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Evaluation::Scored(signal)) => signals.push(*signal),
                Ok(Evaluation::Filtered | Evaluation::NotApplicable | Evaluation::Failed) => {
                    skipped += 1
                }
                Err(e) => {
                    warn!(error = %e, "candidate task failed");
                    skipped += 1;
                }
            }
        }

        (signals, skipped)
    }
}

impl Pipeline {
    /// Full evaluation of one candidate: fetch, filter, detect, score, size.
    async fn evaluate(&self, meta: InstrumentMeta, as_of: NaiveDate) -> Evaluation {
        let filters = &self.config.filters;
        let fetch_timeout = Duration::from_secs(self.config.runtime.fetch_timeout_secs);
        let lookback = self.config.pattern.lookback + self.config.scoring.volume_avg_window;

        let fetched = timeout(fetch_timeout, async {
            let bars = self.source.bars(&meta.ticker, as_of, lookback).await?;
            let flows = self
                .source
                .flows(&meta.ticker, as_of, self.config.pattern.flow_window)
                .await?;
            anyhow::Ok((bars, flows))
        })
        .await;

        let (fetch, flows) = match fetched {
            Ok(Ok(data)) => data,
            Ok(Err(e)) => {
                debug!(ticker = %meta.ticker, error = %e, "data fetch failed, skipping");
                return Evaluation::Failed;
            }
            Err(_) => {
                warn!(ticker = %meta.ticker, "data fetch timed out, skipping");
                return Evaluation::Failed;
            }
        };

        // An instrument whose last session trails the run date was halted or
        // delisted; its bars no longer describe this session.
        if fetch.resolved_date != as_of {
            debug!(ticker = %meta.ticker, last = %fetch.resolved_date, "not traded on run date");
            return Evaluation::Filtered;
        }

        let series = fetch.series;
        let last = match series.last() {
            Some(bar) => *bar,
            None => return Evaluation::Filtered,
        };
        let change_pct = series.change_pct().unwrap_or(0.0);
        let value_traded = last.value();

        if last.close < filters.min_price
            || last.close > filters.max_price
            || change_pct < filters.min_change_pct
            || change_pct > filters.max_change_pct
            || value_traded < filters.min_trading_value
        {
            return Evaluation::Filtered;
        }

        let pattern = match self.detector.detect(&series, &flows) {
            Some(pattern) => pattern,
            None => return Evaluation::NotApplicable,
        };

        let news_timeout = Duration::from_secs(self.config.runtime.news_timeout_secs);
        let mut news_warning = None;
        let news = match timeout(
            news_timeout,
            self.news.stock_news(&meta.ticker, &meta.name, 5),
        )
        .await
        {
            Ok(Ok(items)) => items,
            Ok(Err(e)) => {
                warn!(ticker = %meta.ticker, error = %e, "news fetch failed, scoring without news");
                news_warning = Some(format!("news fetch failed: {e}"));
                Vec::new()
            }
            Err(_) => {
                warn!(ticker = %meta.ticker, "news fetch timed out, scoring without news");
                news_warning = Some("news fetch timed out".to_string());
                Vec::new()
            }
        };

        let mut score = self.scorer.score(&series, &pattern, &news).await;
        if let Some(warning) = news_warning {
            score.warnings.push(warning);
        }
        let grade = self.scorer.grade(score.total);

        Evaluation::Scored(Box::new(Signal {
            id: Uuid::new_v4(),
            ticker: meta.ticker,
            name: meta.name,
            market: meta.market,
            close: last.close,
            change_pct,
            value_traded,
            grade,
            stage: pattern.accumulation.stage,
            is_double_buy: pattern.accumulation.is_double_buy,
            position: self.sizer.plan(last.close, grade),
            score,
            created_at: Utc::now(),
        }))
    }
}
