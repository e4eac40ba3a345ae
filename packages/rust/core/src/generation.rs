//! Text-generation capability.
//!
//! [`ChatCompletionsGenerator`] speaks the OpenAI-compatible chat-completions
//! protocol (OpenRouter by default) and asks the model for a JSON object
//! with an `object` (subject) and a `body`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use onleads_shared::{GenerationConfig, OnLeadsError, Result};

/// What the drafter asks the model for.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system: String,
    pub prompt: String,
}

/// A generated email: subject line and ready-to-send body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedEmail {
    pub object: String,
    pub body: String,
}

/// Anything that can turn a prompt into an email draft.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a draft. Failures and empty bodies are
    /// [`OnLeadsError::Generation`].
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedEmail>;
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// [`TextGenerator`] over an OpenAI-compatible chat-completions endpoint.
pub struct ChatCompletionsGenerator {
    http_client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
}

impl ChatCompletionsGenerator {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OnLeadsError::Generation(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            temperature,
        })
    }

    /// Build from the `[generation]` config section, reading the API key
    /// from its env var.
    pub fn from_config(config: &GenerationConfig) -> Result<Self> {
        Self::new(
            config.api_key()?,
            &config.base_url,
            &config.model,
            config.temperature,
            config.timeout(),
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl TextGenerator for ChatCompletionsGenerator {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedEmail> {
        let start = Instant::now();
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: self.temperature,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "generation request failed");
                if e.is_timeout() {
                    OnLeadsError::Generation("generation request timed out".into())
                } else {
                    OnLeadsError::Generation(format!("generation request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(%status, error = %error_text, "generation API error");
            return Err(OnLeadsError::Generation(format!(
                "generation API returned HTTP {status}"
            )));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| OnLeadsError::Generation(format!("invalid generation response: {e}")))?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| OnLeadsError::Generation("model returned no choices".into()))?;

        debug!(
            duration_ms = start.elapsed().as_millis() as u64,
            chars = content.len(),
            "generation complete"
        );

        parse_generated(&content)
    }
}

/// Parse the model's JSON answer, tolerating a surrounding code fence.
pub(crate) fn parse_generated(content: &str) -> Result<GeneratedEmail> {
    let trimmed = content.trim();
    let json = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed);

    let email: GeneratedEmail = serde_json::from_str(json.trim()).map_err(|e| {
        OnLeadsError::Generation(format!("model answer is not a subject/body object: {e}"))
    })?;

    let email = GeneratedEmail {
        object: email.object.trim().to_string(),
        body: email.body.trim().to_string(),
    };
    if email.body.is_empty() {
        return Err(OnLeadsError::Generation("model returned an empty body".into()));
    }
    Ok(email)
}
