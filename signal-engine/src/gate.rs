//! Market Gate
//!
//! Classifies overall market regime into GREEN/YELLOW/RED from index
//! alignment, RSI, FX level and sector breadth. `evaluate` is a pure function
//! of its input snapshot; rules missing data are skipped with a note, never
//! aborting the evaluation.

use crate::config::GateConfig;
use crate::indicators::{alignment, rsi, sma};
use anyhow::Result;
use chrono::{NaiveDate, Utc};
use common::{FxSnapshot, GateInput, GateResult, IndexSnapshot, MaAlignment, MarketGate};
use market_data::{IndexId, MarketDataSource, SeriesFetch};
use tracing::{debug, warn};

pub struct MarketGateClassifier {
    config: GateConfig,
}

impl MarketGateClassifier {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    /// Evaluate the gate from a snapshot. Deterministic, no side effects;
    /// reasons are appended in fixed rule order so output is reproducible.
    pub fn evaluate(&self, input: &GateInput) -> GateResult {
        let cfg = &self.config;
        let mut score = cfg.base_score;
        let mut reasons = Vec::new();
        let mut skipped = Vec::new();

        // KOSPI: alignment, RSI extremes, daily move.
        match &input.kospi {
            Some(kospi) => {
                match kospi.alignment {
                    MaAlignment::Bullish => {
                        score += cfg.kospi_bullish_pts;
                        reasons.push("KOSPI bullish MA alignment".to_string());
                    }
                    MaAlignment::Bearish => {
                        score += cfg.kospi_bearish_pts;
                        reasons.push("KOSPI bearish MA alignment".to_string());
                    }
                    MaAlignment::Mixed => {}
                }

                match kospi.rsi {
                    Some(value) if value > cfg.rsi_overbought => {
                        score += cfg.rsi_overbought_pts;
                        reasons.push(format!("KOSPI RSI overbought ({value:.1})"));
                    }
                    Some(value) if value < cfg.rsi_oversold => {
                        score += cfg.rsi_oversold_pts;
                        reasons.push(format!("KOSPI RSI oversold ({value:.1})"));
                    }
                    Some(_) => {}
                    None => skipped.push("KOSPI RSI (insufficient history)".to_string()),
                }

                if kospi.change_pct > cfg.index_move_threshold_pct {
                    score += cfg.index_move_pts;
                    reasons.push(format!("KOSPI up {:.2}% on the day", kospi.change_pct));
                } else if kospi.change_pct < -cfg.index_move_threshold_pct {
                    score -= cfg.index_move_pts;
                    reasons.push(format!("KOSPI down {:.2}% on the day", kospi.change_pct));
                }
            }
            None => skipped.push("KOSPI rules (index data unavailable)".to_string()),
        }

        // KOSDAQ: alignment only.
        match &input.kosdaq {
            Some(kosdaq) => match kosdaq.alignment {
                MaAlignment::Bullish => {
                    score += cfg.kosdaq_bullish_pts;
                    reasons.push("KOSDAQ bullish MA alignment".to_string());
                }
                MaAlignment::Bearish => {
                    score += cfg.kosdaq_bearish_pts;
                    reasons.push("KOSDAQ bearish MA alignment".to_string());
                }
                MaAlignment::Mixed => {}
            },
            None => skipped.push("KOSDAQ rules (index data unavailable)".to_string()),
        }

        // USD/KRW level bands; a weakening won is adverse for closing bets.
        match &input.usd_krw {
            Some(fx) => {
                if fx.rate > cfg.fx_danger {
                    score += cfg.fx_danger_pts;
                    reasons.push(format!("USD/KRW above danger level ({:.0})", fx.rate));
                } else if fx.rate > cfg.fx_warning {
                    score += cfg.fx_warning_pts;
                    reasons.push(format!("USD/KRW above warning level ({:.0})", fx.rate));
                } else if fx.rate < cfg.fx_safe {
                    score += cfg.fx_safe_pts;
                    reasons.push(format!("USD/KRW stable ({:.0})", fx.rate));
                }
            }
            None => skipped.push("FX rule (USD/KRW data unavailable)".to_string()),
        }

        // Sector breadth: a majority declining or advancing.
        if input.sectors.is_empty() {
            skipped.push("sector breadth rule (no sector quotes)".to_string());
        } else {
            let declining = input.sectors.iter().filter(|s| s.change_pct < 0.0).count();
            let advancing = input.sectors.iter().filter(|s| s.change_pct > 0.0).count();
            let total = input.sectors.len();
            if declining * 2 > total {
                score -= cfg.sector_breadth_pts;
                reasons.push(format!("sector breadth weak ({declining}/{total} declining)"));
            } else if advancing * 2 > total {
                score += cfg.sector_breadth_pts;
                reasons.push(format!(
                    "sector breadth strong ({advancing}/{total} advancing)"
                ));
            }
        }

        let score = score.clamp(0, 100);
        let gate = if score >= cfg.green_threshold {
            MarketGate::Green
        } else if score < cfg.red_threshold {
            MarketGate::Red
        } else {
            MarketGate::Yellow
        };

        debug!(%gate, score, reasons = reasons.len(), skipped = skipped.len(), "gate evaluated");

        GateResult {
            gate,
            score,
            reasons,
            skipped_rules: skipped,
            kospi: input.kospi.clone(),
            kosdaq: input.kosdaq.clone(),
            usd_krw: input.usd_krw.clone(),
            evaluated_at: Utc::now(),
        }
    }
}

/// Build an [`IndexSnapshot`] from fetched index bars.
pub fn snapshot_index(name: &str, fetch: &SeriesFetch, config: &GateConfig) -> Option<IndexSnapshot> {
    let bars = fetch.series.bars();
    let last = bars.last()?;
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();

    let ma_short = sma(&closes, config.ma_short)?;
    let ma_long = sma(&closes, config.ma_long)?;

    Some(IndexSnapshot {
        name: name.to_string(),
        close: last.close,
        change_pct: fetch.series.change_pct().unwrap_or(0.0),
        ma_short,
        ma_long,
        alignment: alignment(last.close, ma_short, ma_long),
        rsi: rsi(&closes, config.rsi_window),
        is_closed: fetch.is_closed,
        last_trading_date: fetch.resolved_date,
    })
}

/// Assemble a fresh [`GateInput`] from the data source.
///
/// Each constituent fetch may fail independently; a failed piece is logged and
/// left `None` so the corresponding rules are skipped, not the evaluation.
pub async fn collect_gate_input(
    source: &dyn MarketDataSource,
    as_of: NaiveDate,
    config: &GateConfig,
) -> Result<GateInput> {
    let lookback = config.ma_long + config.rsi_window + 5;

    let kospi = match source.index_bars(IndexId::Kospi, as_of, lookback).await {
        Ok(fetch) => snapshot_index("KOSPI", &fetch, config),
        Err(e) => {
            warn!(error = %e, "KOSPI index fetch failed");
            None
        }
    };

    let kosdaq = match source.index_bars(IndexId::Kosdaq, as_of, lookback).await {
        Ok(fetch) => snapshot_index("KOSDAQ", &fetch, config),
        Err(e) => {
            warn!(error = %e, "KOSDAQ index fetch failed");
            None
        }
    };

    let usd_krw = match source.index_bars(IndexId::UsdKrw, as_of, lookback).await {
        Ok(fetch) => fetch.series.last().map(|bar| FxSnapshot {
            rate: bar.close,
            change_pct: fetch.series.change_pct().unwrap_or(0.0),
        }),
        Err(e) => {
            warn!(error = %e, "USD/KRW fetch failed");
            None
        }
    };

    let sectors = match source.sector_quotes(as_of).await {
        Ok(quotes) => quotes,
        Err(e) => {
            warn!(error = %e, "sector quote fetch failed");
            Vec::new()
        }
    };

    Ok(GateInput {
        kospi,
        kosdaq,
        usd_krw,
        sectors,
    })
}
