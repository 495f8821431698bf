use crate::CompletionError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// The shape the caller expects back from a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Text,
    /// A JSON object of the form `{"tags": ["..."]}`.
    TagList,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Content(String),
    Refusal(String),
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        format: ResponseFormat,
    ) -> Result<Completion, CompletionError>;
}

#[async_trait]
impl CompletionProvider for Arc<dyn CompletionProvider> {
    async fn complete(
        &self,
        prompt: &str,
        format: ResponseFormat,
    ) -> Result<Completion, CompletionError> {
        (**self).complete(prompt, format).await
    }
}

/// Chat-completions client for OpenAI-compatible endpoints.
#[derive(Clone)]
pub struct OpenAiCompletion {
    endpoint: Url,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    client: Client,
}

impl OpenAiCompletion {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        model: impl Into<String>,
        temperature: f32,
    ) -> Result<Self, CompletionError> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            endpoint: base.join("chat/completions")?,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            model: model.into(),
            temperature,
            client: Client::new(),
        })
    }

    fn request_body(&self, prompt: &str, format: ResponseFormat) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.temperature,
        });

        if format == ResponseFormat::TagList {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {
                    "name": "tag_list",
                    "strict": true,
                    "schema": {
                        "type": "object",
                        "properties": {
                            "tags": { "type": "array", "items": { "type": "string" } }
                        },
                        "required": ["tags"],
                        "additionalProperties": false
                    }
                }
            });
        }

        body
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompletion {
    async fn complete(
        &self,
        prompt: &str,
        format: ResponseFormat,
    ) -> Result<Completion, CompletionError> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .json(&self.request_body(prompt, format));

        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(provider_error(status, &text));
        }

        let body: Value = response.json().await?;
        debug!(model = %self.model, ?format, "completion received");
        parse_chat_completion(&body)
    }
}

/// Prefers the provider's own `error.message`; bodies that are not JSON
/// (proxy pages, empty replies) fall back to the status line.
fn provider_error(status: StatusCode, body: &str) -> CompletionError {
    let details = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| status.to_string());
    CompletionError::Provider(details)
}

fn parse_chat_completion(body: &Value) -> Result<Completion, CompletionError> {
    let message = body
        .pointer("/choices/0/message")
        .ok_or_else(|| CompletionError::Provider("response has no choices".to_string()))?;

    if let Some(refusal) = message.get("refusal").and_then(Value::as_str) {
        return Ok(Completion::Refusal(refusal.to_string()));
    }

    message
        .get("content")
        .and_then(Value::as_str)
        .map(|content| Completion::Content(content.to_string()))
        .ok_or_else(|| CompletionError::Provider("response message has no content".to_string()))
}
