// Market data contracts (Layer 1)
// Bar/flow/index feeds with the holiday walk-back rule, news items, and sentiment scoring

pub mod news;
pub mod sentiment;
pub mod source;

pub use news::{NewsItem, NewsProvider, NoNews};
pub use sentiment::{
    KeywordSentimentScorer, OpenAiSentimentScorer, SentimentScorer, MAX_SENTIMENT,
};
pub use source::{walk_back, IndexId, InMemorySource, MarketDataSource, SeriesFetch, MAX_WALKBACK_DAYS};
