// Market data source contract
// Consumers only ever see a resolved trading date plus a staleness flag;
// holiday/weekend handling never leaks into gate or scorer logic.

use anyhow::Result;
use chrono::{Duration, NaiveDate};
use common::{Bar, EngineError, FlowRecord, InstrumentMeta, InstrumentSeries, Market, SectorQuote};
use std::collections::HashMap;
use tracing::debug;

/// How many calendar days the source walks back looking for the last session.
pub const MAX_WALKBACK_DAYS: u32 = 10;

/// Index-level instruments the gate consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexId {
    Kospi,
    Kosdaq,
    UsdKrw,
}

impl IndexId {
    /// Vendor ticker for the index.
    pub fn ticker(&self) -> &'static str {
        match self {
            IndexId::Kospi => "^KS11",
            IndexId::Kosdaq => "^KQ11",
            IndexId::UsdKrw => "KRW=X",
        }
    }
}

/// Bars retrieved for a requested date, tagged with the session actually used.
#[derive(Debug, Clone)]
pub struct SeriesFetch {
    /// The session the data belongs to; equals the requested date unless stale.
    pub resolved_date: NaiveDate,
    /// True when the requested date had no session (weekend/holiday).
    pub is_closed: bool,
    pub series: InstrumentSeries,
}

/// Supplies OHLCV bars, investor flows and index/sector data for one trading day.
///
/// Implementations resolve a requested date with no session by walking back up
/// to [`MAX_WALKBACK_DAYS`] calendar days and tagging the result stale; a date
/// with no session inside that window is `DataUnavailable`.
#[async_trait::async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Candidate universe for one market, metadata only.
    async fn instruments(&self, market: Market) -> Result<Vec<InstrumentMeta>>;

    /// Trailing bars for a ticker ending at the resolved session for `as_of`.
    async fn bars(&self, ticker: &str, as_of: NaiveDate, lookback: usize) -> Result<SeriesFetch>;

    /// Per-day net foreign/institution flows ending at the resolved session.
    async fn flows(&self, ticker: &str, as_of: NaiveDate, lookback: usize)
        -> Result<Vec<FlowRecord>>;

    /// Index or FX bars, same walk-back contract as `bars`.
    async fn index_bars(
        &self,
        index: IndexId,
        as_of: NaiveDate,
        lookback: usize,
    ) -> Result<SeriesFetch>;

    /// Closing change of each tracked sector for the resolved session.
    async fn sector_quotes(&self, as_of: NaiveDate) -> Result<Vec<SectorQuote>>;
}

/// Walks backward from `requested` up to `max_days` calendar days until
/// `has_session` answers true. Returns the resolved date and whether it differs
/// from the requested one.
pub fn walk_back(
    requested: NaiveDate,
    max_days: u32,
    has_session: impl Fn(NaiveDate) -> bool,
) -> Option<(NaiveDate, bool)> {
    let mut date = requested;
    for _ in 0..=max_days {
        if has_session(date) {
            return Some((date, date != requested));
        }
        date -= Duration::days(1);
    }
    None
}

/// In-memory data source, used in tests and for replaying recorded sessions.
#[derive(Debug, Default)]
pub struct InMemorySource {
    instruments: HashMap<Market, Vec<InstrumentMeta>>,
    bars: HashMap<String, Vec<Bar>>,
    flows: HashMap<String, Vec<FlowRecord>>,
    index_bars: HashMap<IndexId, Vec<Bar>>,
    sectors: Vec<SectorQuote>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_instrument(&mut self, meta: InstrumentMeta, bars: Vec<Bar>) {
        self.instruments
            .entry(meta.market)
            .or_default()
            .push(meta.clone());
        self.bars.insert(meta.ticker, bars);
    }

    pub fn add_flows(&mut self, ticker: &str, flows: Vec<FlowRecord>) {
        self.flows.insert(ticker.to_string(), flows);
    }

    pub fn add_index(&mut self, index: IndexId, bars: Vec<Bar>) {
        self.index_bars.insert(index, bars);
    }

    pub fn set_sectors(&mut self, sectors: Vec<SectorQuote>) {
        self.sectors = sectors;
    }

    fn fetch(
        &self,
        ticker: &str,
        bars: &[Bar],
        as_of: NaiveDate,
        lookback: usize,
    ) -> Result<SeriesFetch> {
        let (resolved, stale) =
            walk_back(as_of, MAX_WALKBACK_DAYS, |d| bars.iter().any(|b| b.date == d)).ok_or(
                EngineError::DataUnavailable {
                    ticker: ticker.to_string(),
                    requested: as_of,
                    walkback_days: MAX_WALKBACK_DAYS,
                },
            )?;

        if stale {
            debug!(ticker, %as_of, %resolved, "no session on requested date, using last session");
        }

        let mut window: Vec<Bar> = bars
            .iter()
            .filter(|b| b.date <= resolved)
            .copied()
            .collect();
        if window.len() > lookback {
            window.drain(..window.len() - lookback);
        }

        let meta = self
            .instruments
            .values()
            .flatten()
            .find(|m| m.ticker == ticker)
            .cloned()
            .unwrap_or(InstrumentMeta {
                ticker: ticker.to_string(),
                name: ticker.to_string(),
                market: Market::Kospi,
                market_cap: 0,
            });

        Ok(SeriesFetch {
            resolved_date: resolved,
            is_closed: stale,
            series: InstrumentSeries::new(meta, window)?,
        })
    }
}

#[async_trait::async_trait]
impl MarketDataSource for InMemorySource {
    async fn instruments(&self, market: Market) -> Result<Vec<InstrumentMeta>> {
        Ok(self.instruments.get(&market).cloned().unwrap_or_default())
    }

    async fn bars(&self, ticker: &str, as_of: NaiveDate, lookback: usize) -> Result<SeriesFetch> {
        let bars = self
            .bars
            .get(ticker)
            .ok_or_else(|| EngineError::DataUnavailable {
                ticker: ticker.to_string(),
                requested: as_of,
                walkback_days: MAX_WALKBACK_DAYS,
            })?;
        self.fetch(ticker, bars, as_of, lookback)
    }

    async fn flows(
        &self,
        ticker: &str,
        as_of: NaiveDate,
        lookback: usize,
    ) -> Result<Vec<FlowRecord>> {
        let mut flows: Vec<FlowRecord> = self
            .flows
            .get(ticker)
            .map(|f| f.iter().filter(|r| r.date <= as_of).copied().collect())
            .unwrap_or_default();
        if flows.len() > lookback {
            flows.drain(..flows.len() - lookback);
        }
        Ok(flows)
    }

    async fn index_bars(
        &self,
        index: IndexId,
        as_of: NaiveDate,
        lookback: usize,
    ) -> Result<SeriesFetch> {
        let bars = self
            .index_bars
            .get(&index)
            .ok_or_else(|| EngineError::DataUnavailable {
                ticker: index.ticker().to_string(),
                requested: as_of,
                walkback_days: MAX_WALKBACK_DAYS,
            })?;
        self.fetch(index.ticker(), bars, as_of, lookback)
    }

    async fn sector_quotes(&self, _as_of: NaiveDate) -> Result<Vec<SectorQuote>> {
        Ok(self.sectors.clone())
    }
}
