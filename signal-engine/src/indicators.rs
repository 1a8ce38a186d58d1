//! Small pure helpers shared by the gate and the pattern detector.

use common::{Bar, MaAlignment};

/// Simple moving average over the trailing `window` values.
/// Returns `None` when the history is shorter than the window.
pub fn sma(values: &[f64], window: usize) -> Option<f64> {
    if window == 0 || values.len() < window {
        return None;
    }
    let tail = &values[values.len() - window..];
    Some(tail.iter().sum::<f64>() / window as f64)
}

/// RSI over the trailing `window` closes, using mean gain / mean loss.
///
/// Returns 100 when there are no losses in the window, matching the limit of
/// the formula, and `None` when history is too short.
pub fn rsi(closes: &[f64], window: usize) -> Option<f64> {
    if window == 0 || closes.len() < window + 1 {
        return None;
    }
    let tail = &closes[closes.len() - window - 1..];
    let mut gain = 0.0;
    let mut loss = 0.0;
    for pair in tail.windows(2) {
        let delta = pair[1] - pair[0];
        if delta > 0.0 {
            gain += delta;
        } else {
            loss -= delta;
        }
    }
    if loss == 0.0 {
        return Some(100.0);
    }
    let rs = gain / loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// Moving-average alignment of price against short/long averages.
pub fn alignment(close: f64, ma_short: f64, ma_long: f64) -> MaAlignment {
    if close > ma_short && ma_short > ma_long {
        MaAlignment::Bullish
    } else if close < ma_short && ma_short < ma_long {
        MaAlignment::Bearish
    } else {
        MaAlignment::Mixed
    }
}

/// High-low range of each `segment`-sized chunk of `bars`, oldest first,
/// as a percentage of the chunk low. Trailing partial chunks are dropped.
pub fn segment_range_ratios(bars: &[Bar], segment: usize) -> Vec<f64> {
    if segment == 0 {
        return Vec::new();
    }
    bars.chunks(segment)
        .filter(|chunk| chunk.len() == segment)
        .map(|chunk| {
            let high = chunk.iter().map(|b| b.high).fold(f64::MIN, f64::max);
            let low = chunk.iter().map(|b| b.low).fold(f64::MAX, f64::min);
            if low <= 0.0 {
                0.0
            } else {
                (high - low) / low * 100.0
            }
        })
        .collect()
}

/// Average volume over the trailing `window` bars, excluding the last bar.
pub fn trailing_avg_volume(bars: &[Bar], window: usize) -> Option<f64> {
    if window == 0 || bars.len() < window + 1 {
        return None;
    }
    let tail = &bars[bars.len() - window - 1..bars.len() - 1];
    Some(tail.iter().map(|b| b.volume as f64).sum::<f64>() / window as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bar(i: u32, high: f64, low: f64, volume: u64) -> Bar {
        Bar {
            date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap() + chrono::Duration::days(i as i64),
            open: low,
            high,
            low,
            close: (high + low) / 2.0,
            volume,
        }
    }

    #[test]
    fn sma_needs_full_window() {
        let values = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(sma(&values, 2), Some(3.5));
        assert_eq!(sma(&values, 4), Some(2.5));
        assert_eq!(sma(&values, 5), None);
    }

    #[test]
    fn rsi_extremes() {
        // Monotonic rise: no losses, RSI pegged at 100.
        let rising: Vec<f64> = (1..=20).map(|i| i as f64).collect();
        assert_eq!(rsi(&rising, 14), Some(100.0));

        let falling: Vec<f64> = (1..=20).rev().map(|i| i as f64).collect();
        assert!(rsi(&falling, 14).unwrap() < 1e-9);

        assert_eq!(rsi(&[1.0, 2.0], 14), None);
    }

    #[test]
    fn rsi_balanced_moves_sit_midscale() {
        // Alternating +1/-1: equal gain and loss, RSI = 50.
        let mut closes = vec![100.0];
        for i in 0..20 {
            let last = *closes.last().unwrap();
            closes.push(if i % 2 == 0 { last + 1.0 } else { last - 1.0 });
        }
        let value = rsi(&closes, 14).unwrap();
        assert!((value - 50.0).abs() < 1.0);
    }

    #[test]
    fn alignment_orders() {
        assert_eq!(alignment(2650.0, 2600.0, 2550.0), MaAlignment::Bullish);
        assert_eq!(alignment(2500.0, 2550.0, 2600.0), MaAlignment::Bearish);
        assert_eq!(alignment(2580.0, 2600.0, 2550.0), MaAlignment::Mixed);
    }

    #[test]
    fn segment_ratios_drop_partial_chunks() {
        let mut bars = Vec::new();
        for i in 0..20 {
            bars.push(bar(i, 110.0, 100.0, 1_000));
        }
        for i in 20..40 {
            bars.push(bar(i, 105.0, 100.0, 1_000));
        }
        // 7 extra bars that do not fill a segment.
        for i in 40..47 {
            bars.push(bar(i, 103.0, 100.0, 1_000));
        }

        let ratios = segment_range_ratios(&bars, 20);
        assert_eq!(ratios.len(), 2);
        assert!((ratios[0] - 10.0).abs() < 1e-9);
        assert!((ratios[1] - 5.0).abs() < 1e-9);
    }

    #[test]
    fn trailing_volume_excludes_today() {
        let mut bars: Vec<Bar> = (0..20).map(|i| bar(i, 101.0, 100.0, 1_000)).collect();
        bars.push(bar(20, 101.0, 100.0, 9_000)); // spike day
        let avg = trailing_avg_volume(&bars, 20).unwrap();
        assert!((avg - 1_000.0).abs() < 1e-9);
    }
}
