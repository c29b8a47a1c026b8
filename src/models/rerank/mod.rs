#[cfg(test)]
mod tests;

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::http::{Auth, HttpTransport, with_trailing_slash};
use crate::config::RerankConfig;
use crate::{RagError, Result};

const RERANK_TIMEOUT_SECONDS: u64 = 30;
const RERANK_RETRY_ATTEMPTS: u32 = 2;

/// Position of a document in the caller's list together with its relevance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RerankedDocument {
    pub index: usize,
    pub score: f32,
}

/// Re-scores retrieved documents against the question. Output is ordered by
/// descending relevance and may contain fewer entries than the input.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<RerankedDocument>>;
}

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    top_n: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Debug, Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f32,
}

/// Client for a Cohere-style `/rerank` endpoint
#[derive(Debug, Clone)]
pub struct HttpReranker {
    transport: HttpTransport,
    url: Url,
    auth: Auth,
    model: String,
    top_n: Option<usize>,
}

impl HttpReranker {
    #[inline]
    pub fn new(config: &RerankConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| RagError::Config(format!("Invalid rerank endpoint: {}", e)))?;
        let url = with_trailing_slash(&endpoint)
            .join("rerank")
            .map_err(|e| RagError::Config(format!("Failed to build rerank URL: {}", e)))?;

        Ok(Self {
            transport: HttpTransport::new(
                Duration::from_secs(RERANK_TIMEOUT_SECONDS),
                RERANK_RETRY_ATTEMPTS,
            ),
            url,
            auth: config.api_key.clone().map_or(Auth::None, Auth::Bearer),
            model: config.model.clone(),
            top_n: config.top_n,
        })
    }

    #[inline]
    #[must_use]
    pub fn with_transport(mut self, transport: HttpTransport) -> Self {
        self.transport = transport;
        self
    }

    fn rerank_blocking(
        &self,
        query: &str,
        documents: &[String],
    ) -> anyhow::Result<Vec<RerankedDocument>> {
        let request = RerankRequest {
            model: &self.model,
            query,
            documents,
            top_n: self.top_n,
        };
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize rerank request")?;

        let response_text = self
            .transport
            .post_json(&self.url, &self.auth, &request_json)
            .context("Failed to rerank documents")?;

        let response: RerankResponse =
            serde_json::from_str(&response_text).context("Failed to parse rerank response")?;

        let mut ranked = Vec::with_capacity(response.results.len());
        for result in response.results {
            if result.index >= documents.len() {
                anyhow::bail!(
                    "Rerank result index {} out of range for {} documents",
                    result.index,
                    documents.len()
                );
            }
            ranked.push(RerankedDocument {
                index: result.index,
                score: result.relevance_score,
            });
        }
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

        debug!("Reranked {} documents, kept {}", documents.len(), ranked.len());
        Ok(ranked)
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<RerankedDocument>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let client = self.clone();
        let query = query.to_string();
        let documents = documents.to_vec();
        tokio::task::spawn_blocking(move || client.rerank_blocking(&query, &documents))
            .await
            .map_err(|e| RagError::Rerank(format!("Rerank task failed: {}", e)))?
            .map_err(|e| RagError::Rerank(format!("{:#}", e)))
    }
}

/// Reorder `documents` according to reranker output
#[inline]
pub fn apply_ranking(documents: Vec<String>, ranking: &[RerankedDocument]) -> Vec<String> {
    let mut slots: Vec<Option<String>> = documents.into_iter().map(Some).collect();
    ranking
        .iter()
        .filter_map(|r| slots.get_mut(r.index).and_then(Option::take))
        .collect()
}
