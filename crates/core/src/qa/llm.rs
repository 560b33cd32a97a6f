use crate::config::Settings;
use crate::qa::error::LlmDiagnosticsError;
use crate::qa::{AnswerClient, AnswerInput, Provider};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";
const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

const SYSTEM_PROMPT: &str = "You are a financial-document analyst. Answer the user's question \
using only the numbered excerpts provided. Quote figures exactly as they appear. If the \
excerpts do not contain the answer, say so plainly.";

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_anthropic_api_key()?.to_string();
        let base_url =
            std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let max_tokens = std::env::var("ANTHROPIC_MAX_TOKENS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_TOKENS);

        let timeout_secs = std::env::var("ANTHROPIC_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
            model,
            max_tokens,
        })
    }

    async fn create_message(
        &self,
        req: CreateMessageRequest,
    ) -> anyhow::Result<CreateMessageResponse> {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(&self.api_key)?);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let res = self
            .http
            .post(url)
            .headers(headers)
            .json(&req)
            .send()
            .await
            .context("Anthropic request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Anthropic response body")?;
        if !status.is_success() {
            let raw_response_json = serde_json::from_str::<serde_json::Value>(&text).ok();
            return Err(LlmDiagnosticsError {
                provider: Provider::Anthropic,
                stage: "http",
                detail: format!("status={status}"),
                raw_output: Some(text),
                raw_response_json,
            }
            .into());
        }

        serde_json::from_str::<CreateMessageResponse>(&text)
            .with_context(|| format!("failed to decode Anthropic response: {text}"))
    }

    fn render_prompt(input: &AnswerInput) -> String {
        let mut prompt = String::new();
        prompt.push_str("Question: ");
        prompt.push_str(input.question.trim());
        prompt.push_str("\n\nExcerpts:\n");
        for (i, excerpt) in input.excerpts.iter().enumerate() {
            prompt.push_str(&format!("[{}] {}\n", i + 1, excerpt.trim()));
        }
        prompt
    }

    fn response_text(res: &CreateMessageResponse) -> anyhow::Result<String> {
        let mut out = String::new();
        for block in &res.content {
            if let ContentBlock::Text { text } = block {
                out.push_str(text);
            }
        }
        let out = out.trim().to_string();
        if out.is_empty() {
            return Err(LlmDiagnosticsError {
                provider: Provider::Anthropic,
                stage: "empty_output",
                detail: "response contained no text blocks".to_string(),
                raw_output: None,
                raw_response_json: None,
            }
            .into());
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl AnswerClient for AnthropicClient {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn answer(&self, input: AnswerInput) -> anyhow::Result<String> {
        anyhow::ensure!(
            !input.question.trim().is_empty(),
            "question must be non-empty"
        );

        let req = CreateMessageRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: Some(SYSTEM_PROMPT.to_string()),
            messages: vec![Message {
                role: "user",
                content: Self::render_prompt(&input),
            }],
        };

        let res = self.create_message(req).await?;
        Self::response_text(&res)
    }
}

#[derive(Debug, Clone, Serialize)]
struct CreateMessageRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CreateMessageResponse {
    content: Vec<ContentBlock>,

    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "thinking")]
    Thinking {
        #[serde(default)]
        thinking: String,
        #[serde(default)]
        signature: String,
    },

    #[serde(rename = "redacted_thinking")]
    RedactedThinking {
        #[serde(default)]
        data: String,
    },

    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prompt_numbers_the_excerpts() {
        let input = AnswerInput {
            question: "What was revenue?".to_string(),
            excerpts: vec!["Sales were $10B.".to_string(), "Costs were $4B.".to_string()],
        };
        let prompt = AnthropicClient::render_prompt(&input);
        assert!(prompt.starts_with("Question: What was revenue?"));
        assert!(prompt.contains("[1] Sales were $10B."));
        assert!(prompt.contains("[2] Costs were $4B."));
    }

    #[test]
    fn response_text_concatenates_text_blocks() {
        let res: CreateMessageResponse = serde_json::from_value(json!({
            "content": [
                {"type": "thinking", "thinking": "...", "signature": "sig"},
                {"type": "text", "text": "Revenue was "},
                {"type": "text", "text": "$10B."},
                {"type": "tool_use", "id": "t1", "name": "x", "input": {}}
            ],
            "stop_reason": "end_turn"
        }))
        .unwrap();
        assert_eq!(
            AnthropicClient::response_text(&res).unwrap(),
            "Revenue was $10B."
        );
        assert_eq!(res.stop_reason.as_deref(), Some("end_turn"));
    }

    #[test]
    fn empty_response_is_a_diagnostics_error() {
        let res: CreateMessageResponse =
            serde_json::from_value(json!({"content": []})).unwrap();
        let err = AnthropicClient::response_text(&res).unwrap_err();
        let diag = err.downcast_ref::<LlmDiagnosticsError>().unwrap();
        assert_eq!(diag.stage, "empty_output");
    }
}
