// Shared data model for the closing-bet signal engine
// Bars, flows, gate snapshots, score breakdowns and the produced Signal/ScreenerResult records

pub mod error;
pub mod models;

pub use error::EngineError;
pub use models::{
    AccumulationStage, Bar, FlowRecord, FxSnapshot, GateInput, GateResult, Grade, IndexSnapshot,
    InstrumentMeta, InstrumentSeries, MaAlignment, Market, MarketGate, PositionPlan,
    ScoreBreakdown, ScreenerResult, SectorQuote, Signal,
};
