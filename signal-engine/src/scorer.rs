//! 12-point composite scorer
//!
//! Four-plus-one bounded sub-scores: news 0-3, volume 0-3, chart 0-2,
//! candle 0-2, supply 0-2. Each is computed from its own inputs only, so they
//! can be evaluated and tested in isolation. News is the only async factor;
//! a sentiment failure degrades that sub-score to 0 with a warning instead of
//! dropping the instrument.

use crate::config::ScoringConfig;
use crate::pattern::PatternResult;
use common::{AccumulationStage, Grade, InstrumentSeries, ScoreBreakdown};
use market_data::{NewsItem, SentimentScorer};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct SignalScorer {
    config: ScoringConfig,
    sentiment: Arc<dyn SentimentScorer>,
    news_timeout: Duration,
}

impl SignalScorer {
    pub fn new(
        config: ScoringConfig,
        sentiment: Arc<dyn SentimentScorer>,
        news_timeout: Duration,
    ) -> Self {
        Self {
            config,
            sentiment,
            news_timeout,
        }
    }

    /// Compute the full breakdown for one candidate.
    pub async fn score(
        &self,
        series: &InstrumentSeries,
        pattern: &PatternResult,
        news: &[NewsItem],
    ) -> ScoreBreakdown {
        let (news_score, warnings) = self.score_news(&series.meta.name, news).await;
        let volume = self.score_volume(series);
        let chart = self.score_chart(pattern);
        let candle = self.score_candle(series);
        let supply = self.score_supply(pattern);

        let breakdown =
            ScoreBreakdown::new(news_score, volume, chart, candle, supply).with_warnings(warnings);
        debug_assert!(breakdown.total <= ScoreBreakdown::MAX_TOTAL);

        debug!(
            ticker = %series.meta.ticker,
            news = breakdown.news,
            volume = breakdown.volume,
            chart = breakdown.chart,
            candle = breakdown.candle,
            supply = breakdown.supply,
            total = breakdown.total,
            "scored"
        );

        breakdown
    }

    /// News 0-3: score each item independently, take the maximum. Multiple
    /// stories about one event must not stack. No news scores 0; a scorer
    /// failure or timeout also scores 0 but leaves a warning behind.
    async fn score_news(&self, name: &str, news: &[NewsItem]) -> (u8, Vec<String>) {
        let mut best = 0u8;
        let mut warnings = Vec::new();

        for item in news {
            let call = self.sentiment.score_news(&item.title, &item.summary);
            match tokio::time::timeout(self.news_timeout, call).await {
                Ok(Ok(score)) => best = best.max(score.min(3)),
                Ok(Err(e)) => {
                    warn!(name, error = %e, "sentiment scoring failed, news factor degraded");
                    warnings.push(format!("sentiment scoring failed: {e}"));
                }
                Err(_) => {
                    warn!(name, "sentiment scoring timed out, news factor degraded");
                    warnings.push("sentiment scoring timed out".to_string());
                }
            }
        }

        (best, warnings)
    }

    /// Volume 0-3: tiered multiples of the trailing average.
    fn score_volume(&self, series: &InstrumentSeries) -> u8 {
        let bars = series.bars();
        let today = match bars.last() {
            Some(bar) => bar,
            None => return 0,
        };
        let avg = match crate::indicators::trailing_avg_volume(bars, self.config.volume_avg_window)
        {
            Some(avg) if avg > 0.0 => avg,
            _ => return 0,
        };

        let ratio = today.volume as f64 / avg;
        let [t3, t2, t1] = self.config.volume_tiers;
        if ratio >= t3 {
            3
        } else if ratio >= t2 {
            2
        } else if ratio >= t1 {
            1
        } else {
            0
        }
    }

    /// Chart 0-2: confirmed breakout out of a coil scores 2, a still-forming
    /// coil (dry-up) scores 1.
    fn score_chart(&self, pattern: &PatternResult) -> u8 {
        match &pattern.contraction {
            Some(c) if c.breakout => 2,
            Some(c) if c.dry_up => 1,
            _ => 0,
        }
    }

    /// Candle 0-2: one point for a wide-bodied bullish candle with a short
    /// upper wick, one for breaking out of a tight consolidation range.
    fn score_candle(&self, series: &InstrumentSeries) -> u8 {
        let bars = series.bars();
        let today = match bars.last() {
            Some(bar) => bar,
            None => return 0,
        };

        let mut score = 0u8;

        if today.open > 0.0 && today.close > today.open {
            let body_pct = (today.close - today.open) / today.open * 100.0;
            let wick_pct = if today.close > 0.0 {
                (today.high - today.close) / today.close * 100.0
            } else {
                f64::MAX
            };
            if body_pct >= self.config.candle_body_min_pct
                && wick_pct <= self.config.candle_wick_max_pct
            {
                score += 1;
            }
        }

        // Consolidation breakout over the prior volume window, today excluded.
        let window = self.config.volume_avg_window;
        if bars.len() > window {
            let prior = &bars[bars.len() - 1 - window..bars.len() - 1];
            let range_high = prior.iter().map(|b| b.high).fold(f64::MIN, f64::max);
            let range_low = prior.iter().map(|b| b.low).fold(f64::MAX, f64::min);
            if range_low > 0.0 {
                let range_pct = (range_high - range_low) / range_low * 100.0;
                if range_pct <= self.config.consolidation_max_range_pct
                    && today.close > range_high
                {
                    score += 1;
                }
            }
        }

        score
    }

    /// Supply 0-2: sustained double-buy accumulation scores 2, early scores 1.
    fn score_supply(&self, pattern: &PatternResult) -> u8 {
        match pattern.accumulation.stage {
            AccumulationStage::Sustained => 2,
            AccumulationStage::Early => 1,
            AccumulationStage::None => 0,
        }
    }

    /// Grade: monotonic step function of the total score.
    pub fn grade(&self, total: u8) -> Grade {
        if total >= self.config.grade_s_min {
            Grade::S
        } else if total >= self.config.grade_a_min {
            Grade::A
        } else if total >= self.config.grade_b_min {
            Grade::B
        } else {
            Grade::C
        }
    }
}
