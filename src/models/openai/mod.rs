
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::http::{Auth, HttpTransport, with_trailing_slash};
use super::{ChatMessage, ChatModel, EmbeddingModel};
use crate::config::{ChatConfig, EmbeddingConfig};
use crate::{RagError, Result};

/// URL layout of the model service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiFlavor {
    /// `{endpoint}/{operation}` with the model in the request body
    OpenAi,
    /// `{endpoint}/openai/deployments/{model}/{operation}?api-version=...`
    Azure { api_version: String },
}

impl ApiFlavor {
    fn from_version(api_version: Option<&str>) -> Self {
        api_version.map_or(Self::OpenAi, |v| Self::Azure {
            api_version: v.to_string(),
        })
    }

    fn operation_url(&self, endpoint: &Url, model: &str, operation: &str) -> Result<Url> {
        let base = with_trailing_slash(endpoint);
        let url = match self {
            Self::OpenAi => base.join(operation),
            Self::Azure { api_version } => base
                .join(&format!("openai/deployments/{}/{}", model, operation))
                .map(|mut url| {
                    url.query_pairs_mut().append_pair("api-version", api_version);
                    url
                }),
        };
        url.map_err(|e| RagError::Config(format!("Failed to build {} URL: {}", operation, e)))
    }

    fn auth(&self, api_key: Option<&str>) -> Auth {
        match (self, api_key) {
            (_, None) => Auth::None,
            (Self::OpenAi, Some(key)) => Auth::Bearer(key.to_string()),
            (Self::Azure { .. }, Some(key)) => Auth::ApiKey(key.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// Client for an OpenAI-compatible embeddings endpoint. One request per text.
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    transport: HttpTransport,
    url: Url,
    auth: Auth,
    model: String,
    dimension: usize,
}

impl EmbeddingClient {
    #[inline]
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let endpoint = config
            .endpoint_url()
            .map_err(|e| RagError::Config(e.to_string()))?;
        let flavor = ApiFlavor::from_version(config.api_version.as_deref());

        Ok(Self {
            transport: HttpTransport::new(
                Duration::from_secs(config.timeout_seconds),
                config.retry_attempts,
            ),
            url: flavor.operation_url(&endpoint, &config.model, "embeddings")?,
            auth: flavor.auth(config.api_key.as_deref()),
            model: config.model.clone(),
            dimension: config.dimension as usize,
        })
    }

    #[inline]
    #[must_use]
    pub fn with_transport(mut self, transport: HttpTransport) -> Self {
        self.transport = transport;
        self
    }

    #[inline]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Blocking call to the embeddings endpoint
    #[inline]
    pub fn generate_embedding(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        debug!("Generating embedding for text (length: {})", text.len());

        let request = EmbedRequest {
            model: &self.model,
            input: text,
        };
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize embedding request")?;

        let response_text = self
            .transport
            .post_json(&self.url, &self.auth, &request_json)
            .context("Failed to generate embedding")?;

        let response: EmbedResponse =
            serde_json::from_str(&response_text).context("Failed to parse embedding response")?;

        let embedding = response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| anyhow::anyhow!("Embedding response contained no data"))?;

        debug!("Generated embedding with {} dimensions", embedding.len());
        Ok(embedding)
    }
}

#[async_trait]
impl EmbeddingModel for EmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let client = self.clone();
        let text = text.to_string();
        tokio::task::spawn_blocking(move || client.generate_embedding(&text))
            .await
            .map_err(|e| RagError::Embedding(format!("Embedding task failed: {}", e)))?
            .map_err(|e| RagError::Embedding(format!("{:#}", e)))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Client for an OpenAI-compatible chat completions endpoint
#[derive(Debug, Clone)]
pub struct ChatClient {
    transport: HttpTransport,
    url: Url,
    auth: Auth,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl ChatClient {
    #[inline]
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let endpoint = config
            .endpoint_url()
            .map_err(|e| RagError::Config(e.to_string()))?;
        let flavor = ApiFlavor::from_version(config.api_version.as_deref());

        Ok(Self {
            transport: HttpTransport::new(
                Duration::from_secs(config.timeout_seconds),
                config.retry_attempts,
            ),
            url: flavor.operation_url(&endpoint, &config.model, "chat/completions")?,
            auth: flavor.auth(config.api_key.as_deref()),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    #[inline]
    #[must_use]
    pub fn with_transport(mut self, transport: HttpTransport) -> Self {
        self.transport = transport;
        self
    }

    #[inline]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Blocking call to the chat completions endpoint
    #[inline]
    pub fn generate_completion(&self, messages: &[ChatMessage]) -> anyhow::Result<String> {
        debug!(
            "Requesting chat completion from {} ({} messages)",
            self.model,
            messages.len()
        );

        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize chat request")?;

        let response_text = self
            .transport
            .post_json(&self.url, &self.auth, &request_json)
            .context("Failed to complete chat")?;

        let response: ChatResponse =
            serde_json::from_str(&response_text).context("Failed to parse chat response")?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow::anyhow!("Chat response contained no message content"))
    }
}

#[async_trait]
impl ChatModel for ChatClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let client = self.clone();
        let messages = messages.to_vec();
        tokio::task::spawn_blocking(move || client.generate_completion(&messages))
            .await
            .map_err(|e| RagError::Chat(format!("Chat task failed: {}", e)))?
            .map_err(|e| RagError::Chat(format!("{:#}", e)))
    }
}
