
use std::sync::{Arc, LazyLock};

use fancy_regex::{Captures, Regex};
use tracing::{debug, info};

use super::Conversation;
use crate::database::sqlite::SqlDatabase;
use crate::models::{ChatMessage, ChatModel};
use crate::{RagError, Result};

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z]*[ \t]*\r?\n?(.*?)```").expect("valid regex")
});
static TEMPLATE_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(question|query|result)\}").expect("valid regex"));
static PROMPT_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(top_k|table_info|input)\}").expect("valid regex"));

const QUERY_PROMPT: &str = "You are a SQLite expert. Given an input question, first create a \
syntactically correct SQLite query to run, then look at the results of the query and return the \
answer to the input question.
Unless the user specifies in the question a specific number of examples to obtain, query for at \
most {top_k} results using the LIMIT clause as per SQLite. You can order the results to return the \
most informative data in the database.
Never query for all columns from a table. You must query only the columns that are needed to \
answer the question. Wrap each column name in double quotes (\") to denote them as delimited \
identifiers.
Pay attention to use only the column names you can see in the tables below. Be careful to not \
query for columns that do not exist. Also, pay attention to which column is in which table.
Pay attention to use date('now') function to get the current date, if the question involves \
\"today\".

Use the following format:

Question: Question here
SQLQuery: SQL Query to run
SQLResult: Result of the SQLQuery
Answer: Final answer here

Only use the following tables:
{table_info}

Question: {input}
SQLQuery: ";

/// Answers questions by having the chat model write SQL against the statistics database
pub struct TextToSqlAgent {
    database: SqlDatabase,
    chat: Arc<dyn ChatModel>,
    answer_template: String,
    top_k: usize,
}

impl std::fmt::Debug for TextToSqlAgent {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextToSqlAgent")
            .field("database", &self.database)
            .field("top_k", &self.top_k)
            .finish_non_exhaustive()
    }
}

impl TextToSqlAgent {
    #[inline]
    pub fn new(
        database: SqlDatabase,
        chat: Arc<dyn ChatModel>,
        answer_template: impl Into<String>,
        top_k: usize,
    ) -> Self {
        Self {
            database,
            chat,
            answer_template: answer_template.into(),
            top_k,
        }
    }

    /// Write a query for `question`, run it, and phrase the result as an answer
    #[inline]
    pub async fn respond(
        &self,
        question: &str,
        conversation: Conversation,
    ) -> Result<(String, Conversation)> {
        let table_info = self.database.table_info().await?;
        let prompt = query_prompt(&table_info, question, self.top_k);

        let reply = self.chat.complete(&[ChatMessage::user(prompt)]).await?;
        let query = extract_sql(&reply);
        if query.is_empty() {
            return Err(RagError::Sql(format!(
                "Model reply contained no SQL query: {}",
                reply
            )));
        }
        info!("Generated SQL: {}", query);

        let result = self.database.run_query(&query).await?;
        debug!("SQL result: {}", result);

        let answer_prompt = fill_answer_template(&self.answer_template, question, &query, &result);
        let answer = self
            .chat
            .complete(&[ChatMessage::user(answer_prompt)])
            .await?;

        let conversation = conversation.with_turn(question, answer.as_str());
        Ok((answer, conversation))
    }
}

/// Prompt asking for a single SQLite query
#[inline]
pub fn query_prompt(table_info: &str, question: &str, top_k: usize) -> String {
    PROMPT_FIELD
        .replace_all(QUERY_PROMPT, |caps: &Captures<'_>| match &caps[1] {
            "top_k" => top_k.to_string(),
            "table_info" => table_info.to_string(),
            _ => question.to_string(),
        })
        .into_owned()
}

/// Pull the SQL statement out of a model reply: unwraps a fenced code block,
/// drops a leading `SQLQuery:` label and everything from `SQLResult:` on
#[inline]
pub fn extract_sql(reply: &str) -> String {
    let fenced = CODE_FENCE
        .captures(reply)
        .ok()
        .flatten()
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str());
    let text = fenced.unwrap_or(reply);

    let text = text
        .split_once("SQLQuery:")
        .map_or(text, |(_, after)| after);
    let text = text
        .split_once("SQLResult:")
        .map_or(text, |(before, _)| before);

    text.trim().to_string()
}

/// Substitute `{question}`, `{query}` and `{result}` in one pass
#[inline]
pub fn fill_answer_template(template: &str, question: &str, query: &str, result: &str) -> String {
    TEMPLATE_FIELD
        .replace_all(template, |caps: &Captures<'_>| match &caps[1] {
            "question" => question.to_string(),
            "query" => query.to_string(),
            _ => result.to_string(),
        })
        .into_owned()
}
