// News sentiment scoring
// A bounded integer contract: one headline/body pair in, a score in [0, 3] out.
// The HTTP scorer talks to an OpenAI-compatible chat endpoint; the keyword
// scorer is the offline fallback.

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

/// Upper bound of the sentiment scale.
pub const MAX_SENTIMENT: u8 = 3;

/// Scores one headline/body pair on a 0-3 bullishness scale.
///
/// Implementations may be slow or fail independently; callers apply their own
/// timeout and degrade the news sub-score to 0 on error.
#[async_trait::async_trait]
pub trait SentimentScorer: Send + Sync {
    async fn score_news(&self, headline: &str, body: &str) -> Result<u8>;
}

const SYSTEM_PROMPT: &str = "You are a stock news analyst. Rate the headline's \
bullishness for the named stock from 0 to 3: 3 = strong catalyst (major contract, \
turnaround to profit, drug approval, M&A), 2 = positive (earnings beat, new \
product, investment), 1 = weak positive or neutral, 0 = no catalyst or negative. \
Respond with JSON only: {\"score\": 0-3, \"reason\": \"short reason\"}";

/// Sentiment scorer backed by an OpenAI-compatible chat completion endpoint.
pub struct OpenAiSentimentScorer {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct Verdict {
    score: i64,
    #[serde(default)]
    #[allow(dead_code)]
    reason: String,
}

impl OpenAiSentimentScorer {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_url: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Pulls the `{score, reason}` JSON object out of a model reply, tolerating
    /// surrounding prose, and clamps the score to the 0-3 scale.
    fn parse_reply(content: &str) -> Result<u8> {
        let start = content
            .find('{')
            .ok_or_else(|| anyhow!("no JSON object in model reply"))?;
        let end = content
            .rfind('}')
            .ok_or_else(|| anyhow!("no JSON object in model reply"))?;
        let verdict: Verdict = serde_json::from_str(&content[start..=end])?;
        Ok(verdict.score.clamp(0, MAX_SENTIMENT as i64) as u8)
    }
}

#[async_trait::async_trait]
impl SentimentScorer for OpenAiSentimentScorer {
    async fn score_news(&self, headline: &str, body: &str) -> Result<u8> {
        let user = if body.is_empty() {
            format!("Headline: {headline}")
        } else {
            format!("Headline: {headline}\nBody: {body}")
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": [
                    {"role": "system", "content": SYSTEM_PROMPT},
                    {"role": "user", "content": user},
                ],
                "temperature": 0.3,
                "max_tokens": 200,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("sentiment API error: {}", response.status()));
        }

        let reply: ChatResponse = response.json().await?;
        let content = reply
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| anyhow!("empty sentiment reply"))?;

        let score = Self::parse_reply(content)?;
        debug!(score, "sentiment scored");
        Ok(score)
    }
}

/// Keyword fallback used when no model endpoint is configured.
///
/// Counts one point per positive keyword hit and subtracts one per negative
/// hit, clamped to the 0-3 scale, matching the original analyzer's fallback.
pub struct KeywordSentimentScorer {
    positive: Vec<String>,
    negative: Vec<String>,
}

impl KeywordSentimentScorer {
    pub fn new(positive: Vec<String>, negative: Vec<String>) -> Self {
        Self { positive, negative }
    }
}

impl Default for KeywordSentimentScorer {
    fn default() -> Self {
        let positive = [
            "흑자전환",
            "수주",
            "계약",
            "승인",
            "임상성공",
            "사상최대",
            "호실적",
            "신제품",
            "투자유치",
            "인수합병",
            "돌파",
            "신고가",
        ];
        let negative = [
            "적자전환",
            "하락",
            "감소",
            "악화",
            "상장폐지",
            "대량매도",
            "횡령",
            "분식",
            "수사",
            "기소",
        ];
        Self::new(
            positive.iter().map(|s| s.to_string()).collect(),
            negative.iter().map(|s| s.to_string()).collect(),
        )
    }
}

#[async_trait::async_trait]
impl SentimentScorer for KeywordSentimentScorer {
    async fn score_news(&self, headline: &str, body: &str) -> Result<u8> {
        let text = format!("{headline} {body}");
        let hits = self
            .positive
            .iter()
            .filter(|kw| text.contains(kw.as_str()))
            .count() as i64;
        let misses = self
            .negative
            .iter()
            .filter(|kw| text.contains(kw.as_str()))
            .count() as i64;
        Ok((hits - misses).clamp(0, MAX_SENTIMENT as i64) as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_reply_extracts_and_clamps() {
        assert_eq!(
            OpenAiSentimentScorer::parse_reply("{\"score\": 2, \"reason\": \"earnings beat\"}")
                .unwrap(),
            2
        );
        // Prose around the object is tolerated.
        assert_eq!(
            OpenAiSentimentScorer::parse_reply("Sure. {\"score\": 9, \"reason\": \"x\"} done")
                .unwrap(),
            3
        );
        assert!(OpenAiSentimentScorer::parse_reply("no json here").is_err());
    }

    #[tokio::test]
    async fn keyword_scorer_is_bounded() {
        let scorer = KeywordSentimentScorer::default();

        let positive = scorer.score_news("대규모 수주 계약 체결", "").await.unwrap();
        assert!(positive >= 1 && positive <= MAX_SENTIMENT);

        let negative = scorer.score_news("검찰 수사 착수", "").await.unwrap();
        assert_eq!(negative, 0);

        let neutral = scorer.score_news("정기 주주총회 개최", "").await.unwrap();
        assert_eq!(neutral, 0);
    }
}
