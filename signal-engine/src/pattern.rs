//! Pattern detection
//!
//! Two independent structures are scanned per instrument: a volatility
//! contraction (the "coil": shrinking segment ranges, then either a volume
//! dry-up or a confirmed breakout bar) and double-buy accumulation
//! (concurrent foreign + institutional net buying, judged by density over a
//! trailing flow window rather than contiguity).

use crate::config::PatternConfig;
use crate::indicators::{segment_range_ratios, trailing_avg_volume};
use common::{AccumulationStage, FlowRecord, InstrumentSeries};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Volatility-contraction findings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contraction {
    /// Per-segment high-low range ratios, oldest first.
    pub range_ratios: Vec<f64>,
    /// Today's volume sits below its trailing average (still-forming coil).
    pub dry_up: bool,
    /// Volume spike plus a close above the prior range high (confirmed).
    pub breakout: bool,
}

/// Double-buy accumulation findings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Accumulation {
    /// Sessions examined (the trailing flow window, possibly short).
    pub window: usize,
    /// Sessions on which both classes net-bought.
    pub double_buy_days: usize,
    /// double_buy_days / window.
    pub density: f64,
    /// Trailing consecutive net-buy sessions per class.
    pub foreign_streak: usize,
    pub institution_streak: usize,
    pub stage: AccumulationStage,
    pub is_double_buy: bool,
}

/// Advisory output of one pattern scan. Never a fatal condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternResult {
    /// Present when segment ranges contracted inside the price band.
    pub contraction: Option<Contraction>,
    pub accumulation: Accumulation,
}

pub struct PatternDetector {
    config: PatternConfig,
}

impl PatternDetector {
    pub fn new(config: PatternConfig) -> Self {
        Self { config }
    }

    /// Scan one instrument. `None` means the series is shorter than the
    /// minimum lookback: not applicable, excluded silently.
    pub fn detect(&self, series: &InstrumentSeries, flows: &[FlowRecord]) -> Option<PatternResult> {
        if series.len() < self.config.min_history {
            debug!(
                ticker = %series.meta.ticker,
                have = series.len(),
                need = self.config.min_history,
                "insufficient history, skipping"
            );
            return None;
        }

        Some(PatternResult {
            contraction: self.detect_contraction(series),
            accumulation: self.detect_accumulation(flows),
        })
    }

    fn detect_contraction(&self, series: &InstrumentSeries) -> Option<Contraction> {
        let cfg = &self.config;
        let bars = series.bars();
        // Tolerates a series shorter than the lookback; too few full
        // segments then falls out below.
        let window = &bars[bars.len().saturating_sub(cfg.lookback)..];

        let ratios = segment_range_ratios(window, cfg.segment);
        let (&first, &last) = match (ratios.first(), ratios.last()) {
            (Some(first), Some(last)) if ratios.len() >= 2 => (first, last),
            _ => return None,
        };

        // Near-monotonic decrease: each segment no wider than the prior one
        // plus tolerance, and strictly narrower overall.
        let tolerant_decrease = ratios
            .windows(2)
            .all(|pair| pair[1] <= pair[0] * (1.0 + cfg.contraction_tolerance));
        let narrower_overall = last < first;
        let in_band = last <= cfg.coil_max_range_pct;

        if !(tolerant_decrease && narrower_overall && in_band) {
            return None;
        }

        let today = bars.last()?;
        let avg_volume = trailing_avg_volume(bars, cfg.segment)?;
        let dry_up = (today.volume as f64) < avg_volume * cfg.dry_up_ratio;

        // Breakout: close above the prior segment's high on a volume spike.
        let prior = &bars[bars.len() - 1 - cfg.segment..bars.len() - 1];
        let prior_high = prior.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        let breakout = today.close > prior_high
            && (today.volume as f64) >= avg_volume * cfg.breakout_volume_mult;

        Some(Contraction {
            range_ratios: ratios,
            dry_up,
            breakout,
        })
    }

    fn detect_accumulation(&self, flows: &[FlowRecord]) -> Accumulation {
        let cfg = &self.config;
        let start = flows.len().saturating_sub(cfg.flow_window);
        let window = &flows[start..];

        let double_buy_days = window.iter().filter(|f| f.is_double_buy()).count();
        let density = if window.is_empty() {
            0.0
        } else {
            double_buy_days as f64 / window.len() as f64
        };

        let foreign_streak = window
            .iter()
            .rev()
            .take_while(|f| f.foreign_net > 0)
            .count();
        let institution_streak = window
            .iter()
            .rev()
            .take_while(|f| f.institution_net > 0)
            .count();

        // Density rule: enough concurrent sessions, dense enough in the window.
        let is_double_buy = double_buy_days >= cfg.min_days && density >= cfg.min_density;

        let stage = if is_double_buy && double_buy_days >= cfg.sustained_days {
            AccumulationStage::Sustained
        } else if double_buy_days >= cfg.early_days {
            AccumulationStage::Early
        } else {
            AccumulationStage::None
        };

        Accumulation {
            window: window.len(),
            double_buy_days,
            density,
            foreign_streak,
            institution_streak,
            stage,
            is_double_buy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use common::{Bar, InstrumentMeta, Market};

    fn day(i: usize) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap() + Duration::days(i as i64)
    }

    fn series(bars: Vec<Bar>) -> InstrumentSeries {
        InstrumentSeries::new(
            InstrumentMeta {
                ticker: "005930".into(),
                name: "Samsung Electronics".into(),
                market: Market::Kospi,
                market_cap: 1,
            },
            bars,
        )
        .unwrap()
    }

    /// Three 20-bar segments with the given range percentages around 100,
    /// followed by one extra "today" bar.
    fn coil_bars(ranges: [f64; 3], today_close: f64, today_volume: u64) -> Vec<Bar> {
        let mut bars = Vec::new();
        let mut i = 0;
        for range in ranges {
            for _ in 0..20 {
                let low = 100.0;
                let high = low * (1.0 + range / 100.0);
                bars.push(Bar {
                    date: day(i),
                    open: low,
                    high,
                    low,
                    close: (high + low) / 2.0,
                    volume: 1_000,
                });
                i += 1;
            }
        }
        bars.push(Bar {
            date: day(i),
            open: 100.0,
            high: today_close.max(100.0),
            low: 100.0,
            close: today_close,
            volume: today_volume,
        });
        bars
    }

    fn flows(pattern: &[(i64, i64)]) -> Vec<FlowRecord> {
        pattern
            .iter()
            .enumerate()
            .map(|(i, (foreign, inst))| FlowRecord {
                date: day(i),
                foreign_net: *foreign,
                institution_net: *inst,
            })
            .collect()
    }

    #[test]
    fn short_history_is_not_applicable() {
        let detector = PatternDetector::new(PatternConfig::default());
        let bars: Vec<Bar> = (0..30)
            .map(|i| Bar {
                date: day(i),
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.0,
                volume: 1_000,
            })
            .collect();
        assert!(detector.detect(&series(bars), &[]).is_none());
    }

    #[test]
    fn series_shorter_than_the_lookback_never_panics() {
        // A lowered history floor admits series that do not fill the
        // contraction lookback; they must degrade to no-coil, not panic.
        let config = PatternConfig {
            min_history: 30,
            ..PatternConfig::default()
        };
        let detector = PatternDetector::new(config);
        let bars: Vec<Bar> = (0..40)
            .map(|i| Bar {
                date: day(i),
                open: 100.0,
                high: 103.0,
                low: 100.0,
                close: 101.0,
                volume: 1_000,
            })
            .collect();

        let result = detector.detect(&series(bars), &[]).unwrap();
        assert!(result.contraction.is_none());
    }

    #[test]
    fn contracting_ranges_with_breakout_confirm_the_coil() {
        let detector = PatternDetector::new(PatternConfig::default());
        // Ranges 8% -> 6% -> 3%, breakout close above the prior range high
        // (103) on 3.2x average volume.
        let bars = coil_bars([8.0, 6.0, 3.0], 104.0, 3_200);
        let result = detector.detect(&series(bars), &[]).unwrap();

        let contraction = result.contraction.expect("coil expected");
        assert!(contraction.breakout);
        assert!(!contraction.dry_up);
        assert_eq!(contraction.range_ratios.len(), 3);
        assert!(contraction.range_ratios[0] > contraction.range_ratios[2]);
    }

    #[test]
    fn quiet_coil_is_still_forming() {
        let detector = PatternDetector::new(PatternConfig::default());
        // Same contraction, but today trades thin inside the range.
        let bars = coil_bars([8.0, 6.0, 3.0], 101.0, 500);
        let result = detector.detect(&series(bars), &[]).unwrap();

        let contraction = result.contraction.expect("coil expected");
        assert!(contraction.dry_up);
        assert!(!contraction.breakout);
    }

    #[test]
    fn expanding_ranges_are_no_coil() {
        let detector = PatternDetector::new(PatternConfig::default());
        let bars = coil_bars([3.0, 6.0, 8.0], 101.0, 1_000);
        let result = detector.detect(&series(bars), &[]).unwrap();
        assert!(result.contraction.is_none());
    }

    #[test]
    fn near_monotonic_contraction_within_tolerance_counts() {
        let detector = PatternDetector::new(PatternConfig::default());
        // Middle segment widens by under 5% of the prior one.
        let bars = coil_bars([8.0, 8.2, 4.0], 101.0, 500);
        let result = detector.detect(&series(bars), &[]).unwrap();
        assert!(result.contraction.is_some());
    }

    #[test]
    fn six_of_eight_double_buy_sessions_is_sustained() {
        let detector = PatternDetector::new(PatternConfig::default());
        let flows = flows(&[
            (1_000, 500),
            (1_000, 500),
            (-200, 500),
            (1_000, 500),
            (1_000, -100),
            (1_000, 500),
            (1_000, 500),
            (1_000, 500),
        ]);
        let bars = coil_bars([8.0, 6.0, 3.0], 104.0, 3_200);
        let result = detector.detect(&series(bars), &flows).unwrap();

        let acc = result.accumulation;
        assert_eq!(acc.window, 8);
        assert_eq!(acc.double_buy_days, 6);
        assert!(acc.is_double_buy);
        assert_eq!(acc.stage, AccumulationStage::Sustained);
        assert!((acc.density - 0.75).abs() < 1e-9);
        assert_eq!(acc.foreign_streak, 5);
        assert_eq!(acc.institution_streak, 3);
    }

    #[test]
    fn sparse_double_buy_days_stay_early() {
        let detector = PatternDetector::new(PatternConfig::default());
        let flows = flows(&[
            (1_000, 500),
            (-200, -100),
            (-200, 500),
            (1_000, -100),
            (-200, -100),
            (-200, 500),
            (1_000, 500),
            (-200, -100),
        ]);
        let bars = coil_bars([8.0, 6.0, 3.0], 101.0, 500);
        let result = detector.detect(&series(bars), &flows).unwrap();

        let acc = result.accumulation;
        assert_eq!(acc.double_buy_days, 2);
        assert!(!acc.is_double_buy);
        assert_eq!(acc.stage, AccumulationStage::Early);
    }

    #[test]
    fn no_flows_mean_no_accumulation() {
        let detector = PatternDetector::new(PatternConfig::default());
        let bars = coil_bars([8.0, 6.0, 3.0], 101.0, 500);
        let result = detector.detect(&series(bars), &[]).unwrap();

        let acc = result.accumulation;
        assert_eq!(acc.window, 0);
        assert_eq!(acc.stage, AccumulationStage::None);
        assert!(!acc.is_double_buy);
    }

    #[test]
    fn detection_is_idempotent() {
        let detector = PatternDetector::new(PatternConfig::default());
        let bars = coil_bars([8.0, 6.0, 3.0], 104.0, 3_200);
        let flows = flows(&[(1_000, 500); 8]);
        let s = series(bars);

        let first = detector.detect(&s, &flows).unwrap();
        let second = detector.detect(&s, &flows).unwrap();
        assert_eq!(first, second);
    }
}
