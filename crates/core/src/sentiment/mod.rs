//! Sentiment scoring for financial text, delegated to an inference service.

use crate::config::Settings;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PATH: &str = "/v1/sentiment";

/// The downstream classifier rejects long inputs; cap text at this many
/// whitespace-delimited words before sending.
pub const MAX_WORDS: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    /// Numeric encoding used when blending sentiment into price features.
    pub fn numeric(self) -> f64 {
        match self {
            SentimentLabel::Positive => 1.0,
            SentimentLabel::Negative => -1.0,
            SentimentLabel::Neutral => 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentScore {
    pub label: SentimentLabel,
    pub score: f64,
}

#[async_trait::async_trait]
pub trait SentimentClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<SentimentScore>;
}

pub fn truncate_for_model(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= MAX_WORDS {
        return text.to_string();
    }
    words[..MAX_WORDS].join(" ")
}

#[derive(Debug, Clone)]
pub struct HttpSentimentClassifier {
    http: reqwest::Client,
    base_url: String,
    path: String,
}

impl HttpSentimentClassifier {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.require_sentiment_base_url()?.to_string();

        let timeout_secs = std::env::var("SENTIMENT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let path = std::env::var("SENTIMENT_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PATH.to_string());

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build sentiment http client")?;

        Ok(Self {
            http,
            base_url,
            path,
        })
    }

    fn url(&self) -> String {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };

        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[derive(Debug, Serialize)]
struct ClassifyRequest<'a> {
    text: &'a str,
}

#[async_trait::async_trait]
impl SentimentClassifier for HttpSentimentClassifier {
    async fn classify(&self, text: &str) -> Result<SentimentScore> {
        anyhow::ensure!(!text.trim().is_empty(), "text must be non-empty");

        let truncated = truncate_for_model(text);
        let res = self
            .http
            .post(self.url())
            .json(&ClassifyRequest { text: &truncated })
            .send()
            .await
            .context("sentiment request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read sentiment response")?;

        if !status.is_success() {
            anyhow::bail!("sentiment HTTP {status}: {text}");
        }

        serde_json::from_str::<SentimentScore>(&text)
            .with_context(|| format!("failed to parse sentiment response: {text}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn short_text_passes_through_unchanged() {
        let text = "Revenue grew 12%  year over year.";
        assert_eq!(truncate_for_model(text), text);
    }

    #[test]
    fn long_text_is_capped_at_max_words() {
        let text = vec!["word"; MAX_WORDS + 50].join(" ");
        let truncated = truncate_for_model(&text);
        assert_eq!(truncated.split_whitespace().count(), MAX_WORDS);
    }

    #[test]
    fn labels_map_to_numeric_scores() {
        assert_eq!(SentimentLabel::Positive.numeric(), 1.0);
        assert_eq!(SentimentLabel::Negative.numeric(), -1.0);
        assert_eq!(SentimentLabel::Neutral.numeric(), 0.0);
    }

    #[test]
    fn parses_uppercase_wire_labels() {
        let score: SentimentScore =
            serde_json::from_value(json!({"label": "POSITIVE", "score": 0.98})).unwrap();
        assert_eq!(score.label, SentimentLabel::Positive);

        let unknown =
            serde_json::from_value::<SentimentScore>(json!({"label": "MIXED", "score": 0.5}));
        assert!(unknown.is_err());
    }
}
