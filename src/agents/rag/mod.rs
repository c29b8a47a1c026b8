
use std::sync::Arc;

use tracing::{debug, info};

use super::Conversation;
use crate::Result;
use crate::database::lancedb::{DistanceMetric, RecordField, VectorStore};
use crate::models::rerank::apply_ranking;
use crate::models::{ChatMessage, ChatModel, EmbeddingModel, Reranker};

/// Retrieval settings for one question
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchParams {
    pub top_k: usize,
    pub metric: DistanceMetric,
}

/// Answers questions from chunks retrieved out of the vector store
pub struct RagAgent {
    store: VectorStore,
    collection: String,
    system_role: String,
    embedder: Arc<dyn EmbeddingModel>,
    chat: Arc<dyn ChatModel>,
    reranker: Option<Arc<dyn Reranker>>,
}

impl std::fmt::Debug for RagAgent {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagAgent")
            .field("store", &self.store)
            .field("collection", &self.collection)
            .field("reranker", &self.reranker.is_some())
            .finish_non_exhaustive()
    }
}

impl RagAgent {
    #[inline]
    pub fn new(
        store: VectorStore,
        collection: impl Into<String>,
        system_role: impl Into<String>,
        embedder: Arc<dyn EmbeddingModel>,
        chat: Arc<dyn ChatModel>,
    ) -> Self {
        Self {
            store,
            collection: collection.into(),
            system_role: system_role.into(),
            embedder,
            chat,
            reranker: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_reranker(mut self, reranker: Option<Arc<dyn Reranker>>) -> Self {
        self.reranker = reranker;
        self
    }

    /// Answer `question` and return the conversation extended by this turn
    #[inline]
    pub async fn respond(
        &self,
        question: &str,
        params: &SearchParams,
        conversation: Conversation,
    ) -> Result<(String, Conversation)> {
        let query_vector = self.embedder.embed(question).await?;

        let hits = self
            .store
            .search(&self.collection, &query_vector, params.top_k, params.metric)
            .await?;
        let ids: Vec<i64> = hits.iter().map(|hit| hit.row_id).collect();
        debug!("Retrieved rows {:?}", ids);

        let mut documents: Vec<String> = self
            .store
            .fetch_by_ids(&self.collection, &ids, &[RecordField::Text])
            .await?
            .into_iter()
            .filter_map(|record| record.text)
            .collect();

        if let Some(reranker) = &self.reranker {
            let ranking = reranker.rerank(question, &documents).await?;
            documents = apply_ranking(documents, &ranking);
        }

        let prompt = build_prompt(question, &documents);
        debug!("RAG prompt: {}", prompt);

        let messages = [
            ChatMessage::system(self.system_role.as_str()),
            ChatMessage::user(prompt),
        ];
        let answer = self.chat.complete(&messages).await?;

        info!(
            "Answered question from {} retrieved chunks",
            documents.len()
        );
        let conversation = conversation.with_turn(question, answer.as_str());
        Ok((answer, conversation))
    }
}

/// Question followed by the retrieved texts in ranked order
#[inline]
pub fn build_prompt(question: &str, documents: &[String]) -> String {
    format!(
        "User's question: {question} \n\n Search results:\n {}",
        documents.join(" ")
    )
}
