// Closing-bet signal engine (Layer 2)
// Market gate, pattern detection, 12-point scoring and run orchestration

pub mod config;
pub mod gate;
pub mod generator;
pub mod indicators;
pub mod pattern;
pub mod position;
pub mod runner;
pub mod scorer;

pub use config::{
    load_config, EngineConfig, GateConfig, PatternConfig, PositionConfig, RuntimeConfig,
    ScoringConfig, UniverseFilters,
};
pub use gate::{collect_gate_input, snapshot_index, MarketGateClassifier};
pub use generator::SignalGenerator;
pub use pattern::{Accumulation, Contraction, PatternDetector, PatternResult};
pub use position::PositionSizer;
pub use runner::{RunStatus, ScreenerRunner};
pub use scorer::SignalScorer;
