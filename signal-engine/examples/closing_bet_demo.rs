// Example: Closing-Bet Screener Run
// Replays a synthetic session through the full pipeline: market gate,
// pattern detection, scoring, sizing and ranking.

use chrono::{Duration, NaiveDate};
use common::{Bar, FlowRecord, InstrumentMeta, Market};
use market_data::{IndexId, InMemorySource, NoNews};
use signal_engine::{EngineConfig, ScreenerRunner, SignalGenerator};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("=== Closing-Bet Screener - Replay Example ===\n");

    let as_of = weekday(60);
    let source = seeded_session();

    let generator = SignalGenerator::new(
        EngineConfig::default(),
        Arc::new(source),
        Arc::new(NoNews),
        Arc::new(market_data::KeywordSentimentScorer::default()),
    )?;
    let runner = ScreenerRunner::new(generator);

    let result = runner.run_once(as_of).await;

    if let Some(gate) = &result.gate {
        println!("Market Gate: {} (score {})", gate.gate, gate.score);
        for reason in &gate.reasons {
            println!("  - {reason}");
        }
        println!();
    }

    println!(
        "Candidates: {} analyzed, {} skipped, {} degraded\n",
        result.analyzed, result.skipped, result.degraded
    );

    for signal in &result.signals {
        println!(
            "[{}] {} ({}) close {:.0} ({:+.2}%)",
            signal.grade, signal.name, signal.ticker, signal.close, signal.change_pct
        );
        println!(
            "  score {}/12 (news {}, volume {}, chart {}, candle {}, supply {})",
            signal.score.total,
            signal.score.news,
            signal.score.volume,
            signal.score.chart,
            signal.score.candle,
            signal.score.supply
        );
        println!(
            "  {} | entry {:.0} stop {:.0} target {:.0} qty {}",
            signal.stage,
            signal.position.entry_price,
            signal.position.stop_price,
            signal.position.target_price,
            signal.position.quantity
        );
    }

    println!("\nFull result as JSON:");
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}

/// The i-th weekday from Monday 2025-01-06.
fn weekday(i: usize) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 6).unwrap() + Duration::days((i / 5 * 7 + i % 5) as i64)
}

/// One session with a breakout candidate, a quiet candidate and index data.
fn seeded_session() -> InMemorySource {
    let mut source = InMemorySource::new();

    source.add_instrument(
        InstrumentMeta {
            ticker: "042700".into(),
            name: "한미반도체".into(),
            market: Market::Kospi,
            market_cap: 5_000_000_000_000,
        },
        coil_bars([8.0, 6.0, 3.0], 104_000.0, 3_200_000),
    );
    source.add_flows(
        "042700",
        (53..=60)
            .map(|i| FlowRecord {
                date: weekday(i),
                foreign_net: 1_200_000_000,
                institution_net: 600_000_000,
            })
            .collect(),
    );

    source.add_instrument(
        InstrumentMeta {
            ticker: "000660".into(),
            name: "SK하이닉스".into(),
            market: Market::Kosdaq,
            market_cap: 9_000_000_000_000,
        },
        coil_bars([8.0, 6.0, 3.0], 102_000.0, 1_800_000),
    );

    source.add_index(IndexId::Kospi, index_bars(2_400.0, 2_650.0));
    source.add_index(IndexId::Kosdaq, index_bars(820.0, 870.0));
    source.add_index(IndexId::UsdKrw, index_bars(1_290.0, 1_285.0));

    source
}

/// Three 20-bar segments with the given range percentages, then today's bar.
fn coil_bars(ranges: [f64; 3], today_close: f64, today_volume: u64) -> Vec<Bar> {
    let mut bars = Vec::new();
    let mut i = 0;
    for range in ranges {
        for _ in 0..20 {
            let low: f64 = 100_000.0;
            bars.push(Bar {
                date: weekday(i),
                open: low,
                high: low * (1.0 + range / 100.0),
                low,
                close: 100_500.0,
                volume: 1_000_000,
            });
            i += 1;
        }
    }
    bars.push(Bar {
        date: weekday(i),
        open: 100_000.0,
        high: today_close * 1.005,
        low: 100_000.0,
        close: today_close,
        volume: today_volume,
    });
    bars
}

/// A drifting index series long enough for the 60-day average and RSI.
fn index_bars(from: f64, to: f64) -> Vec<Bar> {
    (0..=60)
        .map(|i| {
            let close = from + (to - from) * i as f64 / 60.0;
            Bar {
                date: weekday(i),
                open: close,
                high: close * 1.005,
                low: close * 0.995,
                close,
                volume: 1_000_000,
            }
        })
        .collect()
}
