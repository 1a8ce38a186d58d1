//! Engine configuration
//!
//! Every policy constant (gate points, pattern windows, score tiers, grade
//! boundaries) lives here rather than at the call sites. `validate` runs
//! before any work begins; a bad config is the only fatal error in the system.

use common::EngineError;
use serde::{Deserialize, Serialize};

/// Top-level configuration for one screener instance
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub filters: UniverseFilters,

    #[serde(default)]
    pub gate: GateConfig,

    #[serde(default)]
    pub pattern: PatternConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub position: PositionConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// Coarse universe filters, applied before any per-instrument computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniverseFilters {
    /// Minimum traded value on the evaluation day, in won.
    pub min_trading_value: f64,
    /// Minimum market capitalization, in won.
    pub min_market_cap: u64,
    /// Price band, in won.
    pub min_price: f64,
    pub max_price: f64,
    /// Daily change band, in percent. The upper bound excludes limit-up bars.
    pub min_change_pct: f64,
    pub max_change_pct: f64,
    /// Name substrings that exclude an instrument (SPACs, ETFs, preferred shares).
    #[serde(default)]
    pub exclude_keywords: Vec<String>,
}

impl Default for UniverseFilters {
    fn default() -> Self {
        Self {
            min_trading_value: 50_000_000_000.0, // 50bn won
            min_market_cap: 100_000_000_000,     // 100bn won
            min_price: 1_000.0,
            max_price: 500_000.0,
            min_change_pct: 0.0,
            max_change_pct: 29.9,
            exclude_keywords: [
                "스팩", "SPAC", "ETF", "ETN", "리츠", "우B", "우C", "1우", "2우", "인버스",
                "레버리지",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Market Gate scoring rules and thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    pub ma_short: usize,
    pub ma_long: usize,
    pub rsi_window: usize,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,

    /// Score all rules start from.
    pub base_score: i32,
    pub kospi_bullish_pts: i32,
    pub kospi_bearish_pts: i32,
    pub kosdaq_bullish_pts: i32,
    pub kosdaq_bearish_pts: i32,
    pub rsi_overbought_pts: i32,
    pub rsi_oversold_pts: i32,
    /// Applied when the KOSPI daily move exceeds `index_move_threshold_pct`.
    pub index_move_pts: i32,
    pub index_move_threshold_pct: f64,

    /// USD/KRW level bands.
    pub fx_safe: f64,
    pub fx_warning: f64,
    pub fx_danger: f64,
    pub fx_safe_pts: i32,
    pub fx_warning_pts: i32,
    pub fx_danger_pts: i32,

    /// Applied when a majority of tracked sectors decline/advance.
    pub sector_breadth_pts: i32,

    /// score >= green_threshold -> GREEN, score < red_threshold -> RED.
    pub green_threshold: i32,
    pub red_threshold: i32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            ma_short: 20,
            ma_long: 60,
            rsi_window: 14,
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            base_score: 50,
            kospi_bullish_pts: 10,
            kospi_bearish_pts: -15,
            kosdaq_bullish_pts: 5,
            kosdaq_bearish_pts: -10,
            rsi_overbought_pts: -5,
            rsi_oversold_pts: 5,
            index_move_pts: 5,
            index_move_threshold_pct: 1.0,
            fx_safe: 1_300.0,
            fx_warning: 1_400.0,
            fx_danger: 1_450.0,
            fx_safe_pts: 5,
            fx_warning_pts: -10,
            fx_danger_pts: -15,
            sector_breadth_pts: 10,
            green_threshold: 70,
            red_threshold: 40,
        }
    }
}

/// Volatility-contraction and accumulation detection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternConfig {
    /// Minimum bar history; shorter series are not applicable, not an error.
    pub min_history: usize,
    /// Trailing window examined for the contraction, split into segments.
    pub lookback: usize,
    pub segment: usize,
    /// Relative slack allowed between successive segment ranges.
    pub contraction_tolerance: f64,
    /// The final segment's high-low range ratio must stay inside this band (percent).
    pub coil_max_range_pct: f64,
    /// Dry-up: today's volume below this fraction of its trailing average.
    pub dry_up_ratio: f64,
    /// Breakout: today's volume at least this multiple of its trailing average.
    pub breakout_volume_mult: f64,

    /// Trailing flow window scanned for double-buy sessions.
    pub flow_window: usize,
    /// Minimum count of double-buy sessions inside the window.
    pub min_days: usize,
    /// Minimum fraction of the window that must be double-buy sessions.
    pub min_density: f64,
    /// Day counts that map the pattern to an accumulation stage.
    pub early_days: usize,
    pub sustained_days: usize,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            min_history: 60,
            lookback: 60,
            segment: 20,
            contraction_tolerance: 0.05,
            coil_max_range_pct: 15.0,
            dry_up_ratio: 0.75,
            breakout_volume_mult: 2.0,
            flow_window: 10,
            min_days: 3,
            min_density: 0.6,
            early_days: 2,
            sustained_days: 5,
        }
    }
}

/// Sub-score tiers and grade boundaries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Volume-versus-average multiples awarding 3, 2 and 1 points.
    pub volume_tiers: [f64; 3],
    /// Trailing window for the volume average, excluding the evaluation day.
    pub volume_avg_window: usize,

    /// Bullish candle: body at least this percent of the open...
    pub candle_body_min_pct: f64,
    /// ...with an upper wick no longer than this percent of the close.
    pub candle_wick_max_pct: f64,
    /// Consolidation: prior-window range within this percent before a breakout.
    pub consolidation_max_range_pct: f64,

    /// Grade step boundaries on the 12-point total.
    pub grade_s_min: u8,
    pub grade_a_min: u8,
    pub grade_b_min: u8,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            volume_tiers: [3.0, 2.0, 1.5],
            volume_avg_window: 20,
            candle_body_min_pct: 3.0,
            candle_wick_max_pct: 1.5,
            consolidation_max_range_pct: 15.0,
            grade_s_min: 10,
            grade_a_min: 8,
            grade_b_min: 6,
        }
    }
}

/// R-based position sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionConfig {
    /// Working capital, in won.
    pub capital: f64,
    /// Fraction of capital risked per unit R.
    pub r_ratio: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    /// R multipliers per grade; C is zero, meaning no trade.
    pub r_mult_s: f64,
    pub r_mult_a: f64,
    pub r_mult_b: f64,
    pub r_mult_c: f64,
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            capital: 100_000_000.0,
            r_ratio: 0.005,
            stop_loss_pct: 0.03,
            take_profit_pct: 0.05,
            r_mult_s: 1.5,
            r_mult_a: 1.0,
            r_mult_b: 0.5,
            r_mult_c: 0.0,
        }
    }
}

/// Execution limits for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Upper bound on candidates taken into the expensive per-instrument scan.
    pub max_candidates: usize,
    /// Concurrent per-instrument evaluations; bounds data-source and LLM load.
    pub concurrency: usize,
    pub fetch_timeout_secs: u64,
    pub news_timeout_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_candidates: 50,
            concurrency: 8,
            fetch_timeout_secs: 10,
            news_timeout_secs: 8,
        }
    }
}

impl EngineConfig {
    /// Fails fast on thresholds a run could not honor. Ordering properties are
    /// checked here; the numeric values themselves are policy, not invariants.
    pub fn validate(&self) -> Result<(), EngineError> {
        let err = |msg: String| Err(EngineError::Configuration(msg));

        if self.gate.ma_short >= self.gate.ma_long {
            return err(format!(
                "gate.ma_short ({}) must be below gate.ma_long ({})",
                self.gate.ma_short, self.gate.ma_long
            ));
        }
        if self.gate.green_threshold <= self.gate.red_threshold {
            return err(format!(
                "gate.green_threshold ({}) must exceed gate.red_threshold ({})",
                self.gate.green_threshold, self.gate.red_threshold
            ));
        }
        if self.gate.rsi_oversold >= self.gate.rsi_overbought {
            return err("gate RSI bounds out of order".to_string());
        }

        let [t3, t2, t1] = self.scoring.volume_tiers;
        if !(t3 > t2 && t2 > t1 && t1 > 0.0) {
            return err(format!(
                "scoring.volume_tiers must be strictly decreasing and positive, got {:?}",
                self.scoring.volume_tiers
            ));
        }
        if !(self.scoring.grade_s_min > self.scoring.grade_a_min
            && self.scoring.grade_a_min > self.scoring.grade_b_min)
        {
            return err("grade boundaries must be strictly decreasing S > A > B".to_string());
        }
        if self.scoring.grade_s_min > 12 {
            return err(format!(
                "scoring.grade_s_min ({}) exceeds the 12-point scale",
                self.scoring.grade_s_min
            ));
        }
        if self.scoring.volume_avg_window == 0 {
            return err("scoring.volume_avg_window must be positive".to_string());
        }

        if self.pattern.segment == 0 || self.pattern.lookback < self.pattern.segment * 2 {
            return err(format!(
                "pattern.lookback ({}) must cover at least two segments of {}",
                self.pattern.lookback, self.pattern.segment
            ));
        }
        if self.pattern.min_history < self.pattern.lookback {
            return err(format!(
                "pattern.min_history ({}) must cover pattern.lookback ({})",
                self.pattern.min_history, self.pattern.lookback
            ));
        }
        if self.pattern.flow_window == 0 || self.pattern.min_days > self.pattern.flow_window {
            return err("pattern.min_days must fit inside pattern.flow_window".to_string());
        }
        if !(0.0..=1.0).contains(&self.pattern.min_density) {
            return err(format!(
                "pattern.min_density ({}) must be within [0, 1]",
                self.pattern.min_density
            ));
        }
        if self.pattern.early_days > self.pattern.sustained_days {
            return err("pattern.early_days must not exceed pattern.sustained_days".to_string());
        }

        if self.filters.min_price >= self.filters.max_price {
            return err("filters price band out of order".to_string());
        }
        if self.filters.min_change_pct >= self.filters.max_change_pct {
            return err("filters change band out of order".to_string());
        }

        if self.position.capital <= 0.0 || self.position.r_ratio <= 0.0 {
            return err("position.capital and position.r_ratio must be positive".to_string());
        }
        if self.position.stop_loss_pct <= 0.0 || self.position.stop_loss_pct >= 1.0 {
            return err(format!(
                "position.stop_loss_pct ({}) must be within (0, 1)",
                self.position.stop_loss_pct
            ));
        }

        if self.runtime.concurrency == 0 {
            return err("runtime.concurrency must be positive".to_string());
        }

        Ok(())
    }
}

/// Load configuration from a TOML file.
pub fn load_config(path: &str) -> anyhow::Result<EngineConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: EngineConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}
