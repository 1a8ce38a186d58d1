//! Trigger surface over the generator
//!
//! Callers either await a run directly (`run_once`) or fire one off in the
//! background (`trigger`) and poll `status`/`latest`. One run at a time; a
//! trigger while a run is in flight is refused, not queued.

use crate::generator::SignalGenerator;
use chrono::NaiveDate;
use common::ScreenerResult;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Idle,
    Running,
    Completed,
    /// The background task died; the previous result, if any, is kept.
    Failed,
}

struct RunnerState {
    status: RunStatus,
    latest: Option<ScreenerResult>,
}

impl Default for RunnerState {
    fn default() -> Self {
        Self {
            status: RunStatus::Idle,
            latest: None,
        }
    }
}

pub struct ScreenerRunner {
    generator: Arc<SignalGenerator>,
    state: Arc<RwLock<RunnerState>>,
    /// Held for the duration of every run so runs never overlap.
    run_lock: Arc<Mutex<()>>,
}

impl ScreenerRunner {
    pub fn new(generator: SignalGenerator) -> Self {
        Self {
            generator: Arc::new(generator),
            state: Arc::new(RwLock::new(RunnerState::default())),
            run_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Run to completion and return the result, also recording it as latest.
    /// Waits for any in-flight run to finish before starting.
    pub async fn run_once(&self, as_of: NaiveDate) -> ScreenerResult {
        let _run = self.run_lock.lock().await;
        {
            let mut state = self.state.write().await;
            state.status = RunStatus::Running;
        }
        self.generator.reset_abort();

        let result = self.generator.run(as_of).await;

        let mut state = self.state.write().await;
        state.latest = Some(result.clone());
        state.status = RunStatus::Completed;
        result
    }

    /// Start a background run. Returns false when one is already in flight.
    pub async fn trigger(&self, as_of: NaiveDate) -> bool {
        {
            let mut state = self.state.write().await;
            if state.status == RunStatus::Running {
                info!(%as_of, "run already in flight, trigger refused");
                return false;
            }
            state.status = RunStatus::Running;
        }
        self.generator.reset_abort();

        let generator = Arc::clone(&self.generator);
        let state = Arc::clone(&self.state);
        let run_lock = Arc::clone(&self.run_lock);
        tokio::spawn(async move {
            let _run = run_lock.lock().await;
            // A panic inside the run must surface as Failed, not hang Running.
            let handle = tokio::spawn(async move { generator.run(as_of).await });
            let outcome = handle.await;

            let mut state = state.write().await;
            match outcome {
                Ok(result) => {
                    state.latest = Some(result);
                    state.status = RunStatus::Completed;
                }
                Err(e) => {
                    warn!(error = %e, "background run died");
                    state.status = RunStatus::Failed;
                }
            }
        });

        true
    }

    pub async fn status(&self) -> RunStatus {
        self.state.read().await.status
    }

    /// Most recent completed result, if any run has finished.
    pub async fn latest(&self) -> Option<ScreenerResult> {
        self.state.read().await.latest.clone()
    }

    /// Ask the in-flight run to stop dispatching further candidates.
    pub fn abort(&self) {
        self.generator.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use anyhow::Result;
    use chrono::Duration as ChronoDuration;
    use common::{
        Bar, FlowRecord, InstrumentMeta, Market, SectorQuote,
    };
    use market_data::{
        IndexId, InMemorySource, MarketDataSource, NoNews, SentimentScorer, SeriesFetch,
    };
    use std::time::Duration;

    struct FixedSentiment(u8);

    #[async_trait::async_trait]
    impl SentimentScorer for FixedSentiment {
        async fn score_news(&self, _headline: &str, _body: &str) -> Result<u8> {
            Ok(self.0)
        }
    }

    /// Delegating source that holds the instrument listing open for a while,
    /// keeping a background run observably in flight.
    struct SlowSource {
        inner: InMemorySource,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl MarketDataSource for SlowSource {
        async fn instruments(&self, market: Market) -> Result<Vec<InstrumentMeta>> {
            tokio::time::sleep(self.delay).await;
            self.inner.instruments(market).await
        }

        async fn bars(
            &self,
            ticker: &str,
            as_of: NaiveDate,
            lookback: usize,
        ) -> Result<SeriesFetch> {
            self.inner.bars(ticker, as_of, lookback).await
        }

        async fn flows(
            &self,
            ticker: &str,
            as_of: NaiveDate,
            lookback: usize,
        ) -> Result<Vec<FlowRecord>> {
            self.inner.flows(ticker, as_of, lookback).await
        }

        async fn index_bars(
            &self,
            index: IndexId,
            as_of: NaiveDate,
            lookback: usize,
        ) -> Result<SeriesFetch> {
            self.inner.index_bars(index, as_of, lookback).await
        }

        async fn sector_quotes(&self, as_of: NaiveDate) -> Result<Vec<SectorQuote>> {
            self.inner.sector_quotes(as_of).await
        }
    }

    fn weekday(i: usize) -> NaiveDate {
        let start = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
        start + ChronoDuration::days((i / 5 * 7 + i % 5) as i64)
    }

    fn seeded_source() -> InMemorySource {
        let mut source = InMemorySource::new();
        let mut bars = Vec::new();
        for i in 0..61 {
            bars.push(Bar {
                date: weekday(i),
                open: 100_000.0,
                high: if i == 60 { 104_500.0 } else { 103_000.0 },
                low: 100_000.0,
                close: if i == 60 { 104_000.0 } else { 100_500.0 },
                volume: if i == 60 { 3_200_000 } else { 1_000_000 },
            });
        }
        source.add_instrument(
            InstrumentMeta {
                ticker: "042700".into(),
                name: "한미반도체".into(),
                market: Market::Kospi,
                market_cap: 5_000_000_000_000,
            },
            bars,
        );
        source
    }

    fn runner(source: Arc<dyn MarketDataSource>) -> ScreenerRunner {
        let generator = SignalGenerator::new(
            EngineConfig::default(),
            source,
            Arc::new(NoNews),
            Arc::new(FixedSentiment(0)),
        )
        .unwrap();
        ScreenerRunner::new(generator)
    }

    async fn wait_until_done(runner: &ScreenerRunner) -> RunStatus {
        for _ in 0..200 {
            let status = runner.status().await;
            if status != RunStatus::Running {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("background run never settled");
    }

    #[tokio::test]
    async fn starts_idle_with_no_result() {
        let runner = runner(Arc::new(seeded_source()));
        assert_eq!(runner.status().await, RunStatus::Idle);
        assert!(runner.latest().await.is_none());
    }

    #[tokio::test]
    async fn run_once_completes_and_records_latest() {
        let runner = runner(Arc::new(seeded_source()));
        let result = runner.run_once(weekday(60)).await;

        assert_eq!(runner.status().await, RunStatus::Completed);
        let latest = runner.latest().await.unwrap();
        assert_eq!(latest.as_of, result.as_of);
        assert_eq!(latest.analyzed, result.analyzed);
    }

    #[tokio::test]
    async fn trigger_runs_in_the_background() {
        let runner = runner(Arc::new(seeded_source()));
        assert!(runner.trigger(weekday(60)).await);

        assert_eq!(wait_until_done(&runner).await, RunStatus::Completed);
        assert!(runner.latest().await.is_some());
    }

    #[tokio::test]
    async fn second_trigger_while_running_is_refused() {
        let source = SlowSource {
            inner: seeded_source(),
            delay: Duration::from_millis(300),
        };
        let runner = runner(Arc::new(source));

        assert!(runner.trigger(weekday(60)).await);
        assert_eq!(runner.status().await, RunStatus::Running);
        assert!(!runner.trigger(weekday(60)).await);

        assert_eq!(wait_until_done(&runner).await, RunStatus::Completed);
        // A finished run frees the slot again.
        assert!(runner.trigger(weekday(60)).await);
        wait_until_done(&runner).await;
    }

    #[tokio::test]
    async fn run_once_waits_for_an_in_flight_background_run() {
        let source = SlowSource {
            inner: seeded_source(),
            delay: Duration::from_millis(200),
        };
        let runner = runner(Arc::new(source));

        assert!(runner.trigger(weekday(60)).await);
        // Let the background task claim the run slot.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(runner.status().await, RunStatus::Running);

        // Starts only after the background run releases the run slot, so the
        // recorded state is never a mix of two runs.
        let result = runner.run_once(weekday(60)).await;

        assert_eq!(runner.status().await, RunStatus::Completed);
        let latest = runner.latest().await.unwrap();
        assert_eq!(latest.as_of, result.as_of);
        assert_eq!(latest.analyzed, result.analyzed);
        assert_eq!(latest.processing_time_ms, result.processing_time_ms);
    }

    #[tokio::test]
    async fn abort_forwards_to_the_generator() {
        let source = SlowSource {
            inner: seeded_source(),
            delay: Duration::from_millis(100),
        };
        let runner = runner(Arc::new(source));

        assert!(runner.trigger(weekday(60)).await);
        runner.abort();

        assert_eq!(wait_until_done(&runner).await, RunStatus::Completed);
        let latest = runner.latest().await.unwrap();
        assert_eq!(latest.analyzed, 0);
        assert_eq!(latest.skipped, latest.total_candidates);
    }
}
