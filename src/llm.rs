//! OpenAI-compatible chat-completions client.
//!
//! Works against any server exposing `POST {base_url}/chat/completions`
//! (OpenAI, DashScope compatible mode, vLLM, Ollama's `/v1`, ...). Used
//! for extraction and for answer generation.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use notegraph_core::error::{Error, Result, ServiceKind};
use notegraph_core::generation::{preview, Message, TextGenerator};

use crate::config::Config;
use crate::http::JsonClient;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions client implementing [`TextGenerator`].
pub struct ChatClient {
    client: JsonClient,
    service: ServiceKind,
    base_url: String,
    model: String,
    temperature: Option<f32>,
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

/// Builder for [`ChatClient`].
pub struct ChatClientBuilder {
    service: ServiceKind,
    base_url: String,
    model: Option<String>,
    api_key: Option<String>,
    temperature: Option<f32>,
    timeout_secs: u64,
    max_retries: u32,
    backoff_base: Option<Duration>,
}

impl ChatClientBuilder {
    pub fn new(service: ServiceKind) -> Self {
        Self {
            service,
            base_url: "https://api.openai.com/v1".to_string(),
            model: None,
            api_key: None,
            temperature: None,
            timeout_secs: 120,
            max_retries: 3,
            backoff_base: None,
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// First retry delay; doubles on every further retry.
    pub fn backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = Some(base);
        self
    }

    pub fn build(self) -> Result<ChatClient> {
        let model = self
            .model
            .ok_or_else(|| Error::Config("chat model is required".to_string()))?;

        let mut client =
            JsonClient::new(self.service, self.api_key, self.timeout_secs, self.max_retries)?;
        if let Some(base) = self.backoff_base {
            client = client.with_backoff_base(base);
        }

        Ok(ChatClient {
            client,
            service: self.service,
            base_url: self.base_url.trim_end_matches('/').to_string(),
            model,
            temperature: self.temperature,
        })
    }
}

impl ChatClient {
    pub fn builder(service: ServiceKind) -> ChatClientBuilder {
        ChatClientBuilder::new(service)
    }

    /// Client for the `[extraction]` service.
    pub fn for_extraction(config: &Config) -> Result<Self> {
        let ex = &config.extraction;
        Self::builder(ServiceKind::Extraction)
            .base_url(&ex.base_url)
            .model(&ex.model)
            .api_key(ex.api_key.clone())
            .temperature(ex.temperature)
            .timeout_secs(ex.timeout_secs)
            .max_retries(ex.max_retries)
            .build()
    }

    /// Client for answers: `[extraction]` with `[generation]` overrides.
    pub fn for_generation(config: &Config) -> Result<Self> {
        let ex = &config.extraction;
        let overrides = &config.generation;
        Self::builder(ServiceKind::Generation)
            .base_url(&ex.base_url)
            .model(overrides.model.as_deref().unwrap_or(&ex.model))
            .api_key(ex.api_key.clone())
            .temperature(overrides.temperature.unwrap_or(0.3))
            .timeout_secs(overrides.timeout_secs.unwrap_or(ex.timeout_secs))
            .max_retries(ex.max_retries)
            .build()
    }
}

#[async_trait]
impl TextGenerator for ChatClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, messages: &[Message]) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
        };
        let body = serde_json::to_value(&request)
            .map_err(|e| Error::Config(format!("failed to encode chat request: {}", e)))?;

        tracing::debug!(model = %self.model, messages = messages.len(), "sending chat completion");
        let url = format!("{}/chat/completions", self.base_url);
        let json = self.client.post_json(&url, &body).await?;

        let response: ChatResponse = serde_json::from_value(json).map_err(|e| {
            Error::service(self.service, format!("unexpected chat response: {}", e))
        })?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::service(self.service, "empty chat response"))?;

        tracing::debug!(response = %preview(&content, 100), "chat completion received");
        Ok(content)
    }
}
