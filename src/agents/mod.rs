// Question answering agents
// Vector-retrieval agent and text-to-SQL agent sharing a conversation value

pub mod rag;
pub mod sql;


use serde::{Deserialize, Serialize};

pub use rag::{RagAgent, SearchParams};
pub use sql::TextToSqlAgent;

/// One answered question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
}

/// Turns exchanged in a session, oldest first. Owned by the caller and threaded
/// through each agent call; never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    turns: Vec<ChatTurn>,
}

impl Conversation {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_turn(mut self, question: impl Into<String>, answer: impl Into<String>) -> Self {
        self.turns.push(ChatTurn {
            question: question.into(),
            answer: answer.into(),
        });
        self
    }

    #[inline]
    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    #[inline]
    pub fn last(&self) -> Option<&ChatTurn> {
        self.turns.last()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
