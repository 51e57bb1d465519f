//! Marine-life assistant backed by the Gemini `generateContent` API.

use crate::config::ChatConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_CHAT_TEMPERATURE: f32 = 0.7;
pub const EMPTY_MESSAGE_REPLY: &str = "Please send a non-empty message.";

const SYSTEM_PROMPT: &str = "Be polite and answer only questions about marine life, marine \
organisms, ocean health, zooplankton, phytoplankton, bacteria and fungi. Keep answers brief, \
around 50 words.";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("GOOGLE_API_KEY is not set")]
    MissingApiKey,

    #[error("Chat request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Chat API returned {status}: {detail}")]
    Upstream { status: u16, detail: String },

    #[error("Chat API returned no text")]
    EmptyResponse,
}

#[async_trait]
pub trait ChatReply: Send + Sync {
    async fn reply(&self, text: &str) -> Result<String, ChatError>;
}

pub struct GeminiChat {
    client: reqwest::Client,
    config: ChatConfig,
}

impl GeminiChat {
    pub fn new(config: ChatConfig) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client, config })
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        )
    }
}

#[async_trait]
impl ChatReply for GeminiChat {
    #[tracing::instrument(skip_all, fields(model = %self.config.model))]
    async fn reply(&self, text: &str) -> Result<String, ChatError> {
        if text.trim().is_empty() {
            return Ok(EMPTY_MESSAGE_REPLY.to_string());
        }
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(ChatError::MissingApiKey)?;

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", api_key)
            .json(&GenerateRequest::new(text, self.config.temperature))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "Chat API rejected request");
            return Err(ChatError::Upstream {
                status: status.as_u16(),
                detail,
            });
        }

        response.json::<GenerateResponse>().await?.into_text()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

impl<'a> GenerateRequest<'a> {
    fn new(text: &'a str, temperature: f32) -> Self {
        Self {
            system_instruction: Content {
                role: None,
                parts: [Part {
                    text: SYSTEM_PROMPT,
                }],
            },
            contents: [Content {
                role: Some("user"),
                parts: [Part { text }],
            }],
            generation_config: GenerationConfig { temperature },
        }
    }
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateResponse {
    /// Text of the first candidate, parts joined.
    fn into_text(self) -> Result<String, ChatError> {
        let text: String = self
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ChatError::EmptyResponse);
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(api_key: Option<&str>) -> ChatConfig {
        ChatConfig {
            api_key: api_key.map(str::to_string),
            model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: DEFAULT_CHAT_TEMPERATURE,
            endpoint: "http://127.0.0.1:9/v1beta/".to_string(),
        }
    }

    #[tokio::test]
    async fn test_blank_message_short_circuits() {
        let chat = GeminiChat::new(config(None)).unwrap();
        assert_eq!(chat.reply("   \n").await.unwrap(), EMPTY_MESSAGE_REPLY);
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_at_call_time() {
        let chat = GeminiChat::new(config(None)).unwrap();
        let err = chat.reply("What do copepods eat?").await.unwrap_err();
        assert!(matches!(err, ChatError::MissingApiKey));
    }

    #[test]
    fn test_url_joins_endpoint_and_model() {
        let chat = GeminiChat::new(config(Some("k"))).unwrap();
        assert_eq!(
            chat.url(),
            "http://127.0.0.1:9/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn test_request_payload_shape() {
        let body = serde_json::to_value(GenerateRequest::new("hello", 0.5)).unwrap();

        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(body["generationConfig"]["temperature"], 0.5);
        assert!(body["systemInstruction"].get("role").is_none());
        assert!(
            body["systemInstruction"]["parts"][0]["text"]
                .as_str()
                .unwrap()
                .contains("marine life")
        );
    }

    #[test]
    fn test_response_text_joins_parts_of_first_candidate() {
        let response: GenerateResponse = serde_json::from_value(json!({
            "candidates": [
                {"content": {"parts": [{"text": "Diatoms are "}, {"text": "phytoplankton."}]}},
                {"content": {"parts": [{"text": "ignored"}]}}
            ]
        }))
        .unwrap();

        assert_eq!(response.into_text().unwrap(), "Diatoms are phytoplankton.");
    }

    #[test]
    fn test_response_without_text_is_an_error() {
        for payload in [
            json!({}),
            json!({"candidates": []}),
            json!({"candidates": [{"finishReason": "SAFETY"}]}),
        ] {
            let response: GenerateResponse = serde_json::from_value(payload).unwrap();
            assert!(matches!(response.into_text(), Err(ChatError::EmptyResponse)));
        }
    }
}
