use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One headline with optional body excerpt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    /// Source credibility weight in [0, 1].
    #[serde(default)]
    pub relevance: f64,
}

/// Supplies the day's headlines for one instrument.
///
/// Treated as slow and unreliable; callers wrap every fetch in a timeout and
/// degrade to an empty list on failure.
#[async_trait::async_trait]
pub trait NewsProvider: Send + Sync {
    async fn stock_news(&self, ticker: &str, name: &str, limit: usize) -> Result<Vec<NewsItem>>;
}

/// Null provider for environments without a news feed.
#[derive(Debug, Default)]
pub struct NoNews;

#[async_trait::async_trait]
impl NewsProvider for NoNews {
    async fn stock_news(&self, _ticker: &str, _name: &str, _limit: usize) -> Result<Vec<NewsItem>> {
        Ok(Vec::new())
    }
}
