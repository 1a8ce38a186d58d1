use crate::error::EngineError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Market an instrument is listed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Market {
    #[serde(rename = "KOSPI")]
    Kospi,
    #[serde(rename = "KOSDAQ")]
    Kosdaq,
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Market::Kospi => write!(f, "KOSPI"),
            Market::Kosdaq => write!(f, "KOSDAQ"),
        }
    }
}

/// One OHLCV bar for one instrument on one trading day. Immutable once recorded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Bar {
    /// Traded value for the day (close x volume), in won.
    pub fn value(&self) -> f64 {
        self.close * self.volume as f64
    }
}

/// Static instrument metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentMeta {
    pub ticker: String,
    pub name: String,
    pub market: Market,
    pub market_cap: u64,
}

/// Chronological bar history for one ticker.
///
/// Bars are strictly increasing by date; the constructor rejects anything else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentSeries {
    pub meta: InstrumentMeta,
    bars: Vec<Bar>,
}

impl InstrumentSeries {
    pub fn new(meta: InstrumentMeta, bars: Vec<Bar>) -> Result<Self, EngineError> {
        for pair in bars.windows(2) {
            if pair[1].date <= pair[0].date {
                return Err(EngineError::Configuration(format!(
                    "bars for {} out of order: {} then {}",
                    meta.ticker, pair[0].date, pair[1].date
                )));
            }
        }
        Ok(Self { meta, bars })
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    /// Close-to-close change of the latest bar versus the prior session, in percent.
    pub fn change_pct(&self) -> Option<f64> {
        if self.bars.len() < 2 {
            return None;
        }
        let prev = self.bars[self.bars.len() - 2].close;
        let last = self.bars[self.bars.len() - 1].close;
        if prev <= 0.0 {
            return None;
        }
        Some((last - prev) / prev * 100.0)
    }
}

/// Per-day net buy/sell value by investor class, in won. Positive is net buying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRecord {
    pub date: NaiveDate,
    pub foreign_net: i64,
    pub institution_net: i64,
}

impl FlowRecord {
    /// Both investor classes net-bought on this day.
    pub fn is_double_buy(&self) -> bool {
        self.foreign_net > 0 && self.institution_net > 0
    }
}

/// Moving-average alignment of an index or instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaAlignment {
    /// price > short MA > long MA
    Bullish,
    /// price < short MA < long MA
    Bearish,
    Mixed,
}

impl fmt::Display for MaAlignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaAlignment::Bullish => write!(f, "bullish"),
            MaAlignment::Bearish => write!(f, "bearish"),
            MaAlignment::Mixed => write!(f, "mixed"),
        }
    }
}

/// Snapshot of one index as of the resolved trading date
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub name: String,
    pub close: f64,
    pub change_pct: f64,
    pub ma_short: f64,
    pub ma_long: f64,
    pub alignment: MaAlignment,
    pub rsi: Option<f64>,
    /// True when the requested date had no session and data was walked back.
    pub is_closed: bool,
    pub last_trading_date: NaiveDate,
}

/// USD/KRW snapshot
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FxSnapshot {
    pub rate: f64,
    pub change_pct: f64,
}

/// Closing quote for one tracked sector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorQuote {
    pub name: String,
    pub change_pct: f64,
}

/// Inputs to one Market Gate evaluation. Derived fresh each run, never persisted.
///
/// Any missing piece causes the corresponding gate rules to be skipped,
/// not the whole evaluation to fail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateInput {
    pub kospi: Option<IndexSnapshot>,
    pub kosdaq: Option<IndexSnapshot>,
    pub usd_krw: Option<FxSnapshot>,
    pub sectors: Vec<SectorQuote>,
}

/// Three-level market regime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketGate {
    #[serde(rename = "GREEN")]
    Green,
    #[serde(rename = "YELLOW")]
    Yellow,
    #[serde(rename = "RED")]
    Red,
}

impl fmt::Display for MarketGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketGate::Green => write!(f, "GREEN"),
            MarketGate::Yellow => write!(f, "YELLOW"),
            MarketGate::Red => write!(f, "RED"),
        }
    }
}

/// Result of one Market Gate evaluation. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateResult {
    pub gate: MarketGate,
    pub score: i32,
    /// Human-readable findings in stable evaluation order.
    pub reasons: Vec<String>,
    /// Rules that could not run for lack of input data.
    pub skipped_rules: Vec<String>,
    pub kospi: Option<IndexSnapshot>,
    pub kosdaq: Option<IndexSnapshot>,
    pub usd_krw: Option<FxSnapshot>,
    pub evaluated_at: DateTime<Utc>,
}

/// Textual accumulation phase derived from double-buy run length and density
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccumulationStage {
    /// Concurrent foreign + institutional buying sustained across the window.
    Sustained,
    /// Concurrent buying has started but not yet persisted.
    Early,
    /// No concurrent accumulation detected.
    None,
}

impl fmt::Display for AccumulationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccumulationStage::Sustained => write!(f, "sustained accumulation"),
            AccumulationStage::Early => write!(f, "early accumulation"),
            AccumulationStage::None => write!(f, "no accumulation"),
        }
    }
}

/// 12-point composite score, one bounded sub-score per factor.
///
/// `total` always equals the sum of the sub-scores; construct via
/// [`ScoreBreakdown::new`] so the invariant holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// News sentiment, 0-3
    pub news: u8,
    /// Volume versus trailing average, 0-3
    pub volume: u8,
    /// Volatility-contraction pattern, 0-2
    pub chart: u8,
    /// Candle shape + consolidation breakout, 0-2
    pub candle: u8,
    /// Double-buy accumulation, 0-2
    pub supply: u8,
    pub total: u8,
    /// Degradation notes, e.g. a sentiment scorer timeout.
    pub warnings: Vec<String>,
}

impl ScoreBreakdown {
    pub const MAX_TOTAL: u8 = 12;

    pub fn new(news: u8, volume: u8, chart: u8, candle: u8, supply: u8) -> Self {
        debug_assert!(news <= 3 && volume <= 3 && chart <= 2 && candle <= 2 && supply <= 2);
        Self {
            news,
            volume,
            chart,
            candle,
            supply,
            total: news + volume + chart + candle + supply,
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Discretized confidence tier derived from the composite score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    S,
    A,
    B,
    C,
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grade::S => write!(f, "S"),
            Grade::A => write!(f, "A"),
            Grade::B => write!(f, "B"),
            Grade::C => write!(f, "C"),
        }
    }
}

/// R-based sizing plan attached to a signal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionPlan {
    pub entry_price: f64,
    pub stop_price: f64,
    pub target_price: f64,
    /// Capital at risk if the stop is hit, in won.
    pub r_value: f64,
    pub quantity: u64,
    pub position_value: f64,
    /// Position value as a percentage of capital.
    pub position_pct: f64,
}

/// One scored closing-bet candidate. Created fresh per run, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub ticker: String,
    pub name: String,
    pub market: Market,
    pub close: f64,
    pub change_pct: f64,
    /// Traded value on the evaluation day, in won. Tie-break for ranking.
    pub value_traded: f64,
    pub score: ScoreBreakdown,
    pub grade: Grade,
    pub stage: AccumulationStage,
    pub is_double_buy: bool,
    pub position: PositionPlan,
    pub created_at: DateTime<Utc>,
}

/// Output of one screener run: the ranked signal set plus aggregates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenerResult {
    /// Resolved trading date after the staleness walk-back.
    pub as_of: NaiveDate,
    /// True when the requested date had no session.
    pub stale: bool,
    pub gate: Option<GateResult>,
    pub total_candidates: usize,
    pub analyzed: usize,
    pub skipped: usize,
    /// Candidates scored with at least one degraded sub-score.
    pub degraded: usize,
    pub by_grade: BTreeMap<Grade, usize>,
    /// Ranked by total score descending, then value traded descending.
    pub signals: Vec<Signal>,
    pub processing_time_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(y: i32, m: u32, d: u32, close: f64) -> Bar {
        Bar {
            date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1_000,
        }
    }

    fn meta() -> InstrumentMeta {
        InstrumentMeta {
            ticker: "005930".into(),
            name: "Samsung Electronics".into(),
            market: Market::Kospi,
            market_cap: 400_000_000_000_000,
        }
    }

    #[test]
    fn series_rejects_out_of_order_bars() {
        let bars = vec![bar(2025, 3, 4, 100.0), bar(2025, 3, 3, 101.0)];
        assert!(InstrumentSeries::new(meta(), bars).is_err());

        let dup = vec![bar(2025, 3, 4, 100.0), bar(2025, 3, 4, 101.0)];
        assert!(InstrumentSeries::new(meta(), dup).is_err());
    }

    #[test]
    fn change_pct_uses_prior_close() {
        let bars = vec![bar(2025, 3, 3, 100.0), bar(2025, 3, 4, 106.0)];
        let series = InstrumentSeries::new(meta(), bars).unwrap();
        let pct = series.change_pct().unwrap();
        assert!((pct - 6.0).abs() < 1e-9);
    }

    #[test]
    fn breakdown_total_is_sum_of_sub_scores() {
        let score = ScoreBreakdown::new(2, 3, 2, 1, 2);
        assert_eq!(score.total, 10);
        assert_eq!(
            score.total,
            score.news + score.volume + score.chart + score.candle + score.supply
        );
        assert!(score.total <= ScoreBreakdown::MAX_TOTAL);
        assert!(!score.is_degraded());
    }

    #[test]
    fn breakdown_warnings_mark_degradation() {
        let score =
            ScoreBreakdown::new(0, 3, 2, 0, 2).with_warnings(vec!["sentiment timed out".into()]);
        assert!(score.is_degraded());
        assert_eq!(score.total, 7);
    }

    #[test]
    fn gate_and_grade_serialize_as_uppercase_strings() {
        assert_eq!(
            serde_json::to_string(&MarketGate::Green).unwrap(),
            "\"GREEN\""
        );
        assert_eq!(serde_json::to_string(&Grade::S).unwrap(), "\"S\"");
        assert_eq!(serde_json::to_string(&Market::Kosdaq).unwrap(), "\"KOSDAQ\"");
    }

    #[test]
    fn double_buy_requires_both_classes_positive() {
        let both = FlowRecord {
            date: NaiveDate::from_ymd_opt(2025, 3, 4).unwrap(),
            foreign_net: 1_000,
            institution_net: 500,
        };
        assert!(both.is_double_buy());

        let foreign_only = FlowRecord {
            institution_net: -10,
            ..both
        };
        assert!(!foreign_only.is_double_buy());
    }
}
