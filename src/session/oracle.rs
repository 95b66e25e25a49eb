//! LLM completion client behind a trait seam.
//!
//! The pipeline stages only see [`ReasoningOracle`]; the production
//! implementation speaks the messages API over HTTP, tests substitute a
//! scripted stub.

use crate::core::config::OracleConfig;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One completion request: a system prompt plus the running transcript.
#[derive(Debug, Clone)]
pub struct OracleRequest {
    pub system: String,
    pub messages: Vec<ChatMessage>,
}

#[async_trait]
pub trait ReasoningOracle: Send + Sync {
    async fn complete(&self, request: OracleRequest) -> Result<String>;
}

/// HTTP client for an Anthropic-compatible `/v1/messages` endpoint.
pub struct MessagesApiOracle {
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

impl MessagesApiOracle {
    pub fn new(config: &OracleConfig) -> Result<Self> {
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.require_api_key()?,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            client: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl ReasoningOracle for MessagesApiOracle {
    async fn complete(&self, request: OracleRequest) -> Result<String> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system: &request.system,
            messages: &request.messages,
        };
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .context("Completion request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Completion request returned {status}: {body}"));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .context("Failed to parse completion response")?;
        let text: String = parsed
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("");
        if text.is_empty() {
            return Err(anyhow!("Completion response has no text blocks"));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn oracle(base_url: &str) -> MessagesApiOracle {
        MessagesApiOracle {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: "test-key".to_string(),
            model: "test-model".to_string(),
            max_tokens: 256,
            temperature: 0.7,
            client: reqwest::Client::new(),
        }
    }

    #[tokio::test]
    async fn test_concatenates_text_blocks_skipping_others() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [
                    {"type": "text", "text": "Hello"},
                    {"type": "thinking", "thinking": "..."},
                    {"type": "text", "text": " world"}
                ]
            })))
            .mount(&server)
            .await;

        let reply = oracle(&server.uri())
            .complete(OracleRequest {
                system: "You are a test".to_string(),
                messages: vec![ChatMessage::user("hi")],
            })
            .await
            .unwrap();
        assert_eq!(reply, "Hello world");
    }

    #[tokio::test]
    async fn test_http_error_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let err = oracle(&server.uri())
            .complete(OracleRequest {
                system: String::new(),
                messages: vec![ChatMessage::user("hi")],
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("401"));
    }
}
