use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::ModelConfig;

/// Bound on every AI call so a hung endpoint can never wedge a caller.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Some OpenAI-compatible servers reject requests without a bearer token
/// even when they ignore its value.
const FALLBACK_API_KEY: &str = "dummy-key";

#[derive(Debug, Clone)]
pub enum MessageContent {
    Text(String),
    /// Text prompt plus an inline image, sent as an OpenAI content-part
    /// array with a data URL.
    TextWithImage {
        text: String,
        image_data_url: String,
    },
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user_image(text: impl Into<String>, image_data_url: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: MessageContent::TextWithImage {
                text: text.into(),
                image_data_url: image_data_url.into(),
            },
        }
    }

    fn to_json(&self) -> Value {
        match &self.content {
            MessageContent::Text(text) => json!({"role": self.role, "content": text}),
            MessageContent::TextWithImage {
                text,
                image_data_url,
            } => json!({
                "role": self.role,
                "content": [
                    {"type": "text", "text": text},
                    {"type": "image_url", "image_url": {"url": image_data_url}}
                ]
            }),
        }
    }
}

/// The AI wire client: one chat-completion call and one model listing,
/// both against a caller-supplied model config.
#[async_trait]
pub trait RemoteModel: Send + Sync {
    async fn chat_completion(&self, config: &ModelConfig, messages: &[ChatMessage])
        -> Result<String>;

    async fn list_models(&self, config: &ModelConfig) -> Result<Vec<String>>;
}

/// Client for OpenAI-compatible HTTP endpoints (`/chat/completions`,
/// `/models`).
pub struct OpenAiModelClient {
    client: Client,
}

impl OpenAiModelClient {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client construction cannot fail with static options");
        Self { client }
    }

    fn bearer_token(config: &ModelConfig) -> &str {
        if config.api_key.trim().is_empty() {
            FALLBACK_API_KEY
        } else {
            &config.api_key
        }
    }

    fn endpoint(config: &ModelConfig, path: &str) -> String {
        format!("{}/{}", config.base_url.trim_end_matches('/'), path)
    }
}

impl Default for OpenAiModelClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Map transport errors onto the human-readable strings surfaced in probe
/// details and speech bubbles.
fn describe_transport_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "connection timed out, check the network or base URL".to_string()
    } else if err.is_connect() {
        "could not reach the endpoint, check the base URL".to_string()
    } else {
        format!("request failed: {err}")
    }
}

fn describe_status(status: reqwest::StatusCode, body: &str) -> String {
    match status.as_u16() {
        401 | 403 => "API key is invalid or missing".to_string(),
        404 => "API endpoint not found, check the base URL".to_string(),
        _ => format!("API error {status}: {body}"),
    }
}

#[async_trait]
impl RemoteModel for OpenAiModelClient {
    async fn chat_completion(
        &self,
        config: &ModelConfig,
        messages: &[ChatMessage],
    ) -> Result<String> {
        if !config.is_configured() {
            bail!("model is not configured (base URL and model name required)");
        }

        let body = json!({
            "model": config.model_name,
            "messages": messages.iter().map(ChatMessage::to_json).collect::<Vec<_>>(),
        });

        let response = self
            .client
            .post(Self::endpoint(config, "chat/completions"))
            .bearer_auth(Self::bearer_token(config))
            .json(&body)
            .send()
            .await
            .map_err(|err| anyhow!(describe_transport_error(&err)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!(describe_status(status, &body));
        }

        let payload: Value = response
            .json()
            .await
            .context("failed to decode chat completion response")?;

        let content = payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| anyhow!("model returned an empty response"))?;

        Ok(content.to_string())
    }

    async fn list_models(&self, config: &ModelConfig) -> Result<Vec<String>> {
        if !config.is_configured() {
            bail!("model is not configured (base URL and model name required)");
        }

        let response = self
            .client
            .get(Self::endpoint(config, "models"))
            .bearer_auth(Self::bearer_token(config))
            .send()
            .await
            .map_err(|err| anyhow!(describe_transport_error(&err)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!(describe_status(status, &body));
        }

        let payload: Value = response
            .json()
            .await
            .context("failed to decode model list response")?;

        let names = payload
            .get("data")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| entry.get("id").and_then(Value::as_str))
                    .map(ToOwned::to_owned)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str, model_name: &str) -> ModelConfig {
        ModelConfig {
            base_url: base_url.into(),
            api_key: String::new(),
            model_name: model_name.into(),
        }
    }

    #[test]
    fn endpoint_tolerates_trailing_slash() {
        let cfg = config("http://localhost:1234/v1/", "m");
        assert_eq!(
            OpenAiModelClient::endpoint(&cfg, "chat/completions"),
            "http://localhost:1234/v1/chat/completions"
        );
    }

    #[test]
    fn image_messages_use_content_part_arrays() {
        let message = ChatMessage::user_image("describe this", "data:image/jpeg;base64,AAAA");
        let value = message.to_json();
        assert_eq!(value["content"][0]["type"], "text");
        assert_eq!(value["content"][1]["image_url"]["url"], "data:image/jpeg;base64,AAAA");
    }

    #[tokio::test]
    async fn unconfigured_model_is_rejected_before_any_request() {
        let client = OpenAiModelClient::new();
        let err = client
            .chat_completion(&config("", ""), &[ChatMessage::user_text("hi")])
            .await
            .expect_err("must fail");
        assert!(err.to_string().contains("not configured"));
    }
}
