// Model provider module
// Chat completion, embedding and re-ranking clients behind async traits

pub mod http;
pub mod openai;
pub mod rerank;

#[cfg(test)]
mod tests;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::config::Config;

pub use openai::{ChatClient, EmbeddingClient};
pub use rerank::{HttpReranker, RerankedDocument, Reranker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[inline]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[inline]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Maps text to a fixed-width vector. Questions and corpus chunks must go
/// through the same model so they share one embedding space.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Width of every vector returned by [`embed`](EmbeddingModel::embed)
    fn dimension(&self) -> usize;
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send the messages and return the text of the model's reply
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// The set of model clients shared by the ingestion pipeline and the agents
#[derive(Clone)]
pub struct ModelProvider {
    pub chat: Arc<dyn ChatModel>,
    pub embeddings: Arc<dyn EmbeddingModel>,
    pub reranker: Option<Arc<dyn Reranker>>,
}

impl ModelProvider {
    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        let chat = ChatClient::new(&config.chat)?;
        let embeddings = EmbeddingClient::new(&config.embeddings)?;
        let reranker = config
            .rerank
            .as_ref()
            .map(HttpReranker::new)
            .transpose()?
            .map(|r| Arc::new(r) as Arc<dyn Reranker>);

        Ok(Self {
            chat: Arc::new(chat),
            embeddings: Arc::new(embeddings),
            reranker,
        })
    }
}

impl fmt::Debug for ModelProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelProvider")
            .field("embedding_dimension", &self.embeddings.dimension())
            .field("reranker", &self.reranker.is_some())
            .finish_non_exhaustive()
    }
}
