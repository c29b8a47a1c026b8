#[cfg(test)]
mod tests;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::loader::{Row, Table};
use crate::{RagError, Result};

/// Key injected ahead of the row data in every chunk
pub const DESCRIPTION_KEY: &str = "dataset_description";

/// Granularity of the embedded unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkMode {
    /// One chunk per row
    Row,
    /// One chunk per row batch
    #[default]
    Batch,
}

impl fmt::Display for ChunkMode {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Row => write!(f, "row"),
            Self::Batch => write!(f, "batch"),
        }
    }
}

impl FromStr for ChunkMode {
    type Err = String;

    #[inline]
    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "row" => Ok(Self::Row),
            "batch" => Ok(Self::Batch),
            other => Err(format!("unknown chunk mode '{}' (expected row or batch)", other)),
        }
    }
}

/// Text ready to be embedded, with the metadata stored next to its vector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub source: String,
    pub description: String,
    pub batch_index: usize,
}

/// Split rows into consecutive batches of `batch_size`; the last batch may be short
#[inline]
pub fn batch_rows(rows: &[Row], batch_size: usize) -> Result<std::slice::Chunks<'_, Row>> {
    if batch_size == 0 {
        return Err(RagError::Ingestion(
            "Batch size must be positive".to_string(),
        ));
    }
    Ok(rows.chunks(batch_size))
}

/// Serialize a table into chunks annotated with its dataset description.
/// A source column named [`DESCRIPTION_KEY`] is rejected.
#[inline]
pub fn build_chunks(
    table: &Table,
    description: &str,
    batch_size: usize,
    mode: ChunkMode,
) -> Result<Vec<Chunk>> {
    let collides = table.columns.iter().any(|c| c == DESCRIPTION_KEY)
        || table.rows.iter().any(|row| row.contains_key(DESCRIPTION_KEY));
    if collides {
        return Err(RagError::Ingestion(format!(
            "Table {} has a column named '{}', which is reserved for the dataset description",
            table.name, DESCRIPTION_KEY
        )));
    }

    let mut chunks = Vec::new();

    for (batch_index, batch) in batch_rows(&table.rows, batch_size)?.enumerate() {
        match mode {
            ChunkMode::Batch => {
                let text = batch_text(description, batch)?;
                chunks.push(Chunk {
                    text,
                    source: table.name.clone(),
                    description: description.to_string(),
                    batch_index,
                });
            }
            ChunkMode::Row => {
                for row in batch {
                    chunks.push(Chunk {
                        text: row_text(description, row)?,
                        source: table.name.clone(),
                        description: description.to_string(),
                        batch_index,
                    });
                }
            }
        }
    }

    debug!(
        "Built {} {} chunks from {} rows of {}",
        chunks.len(),
        mode,
        table.rows.len(),
        table.name
    );
    Ok(chunks)
}

fn batch_text(description: &str, rows: &[Row]) -> Result<String> {
    let mut object = Map::new();
    object.insert(DESCRIPTION_KEY.to_string(), Value::from(description));
    object.insert(
        "rows".to_string(),
        Value::Array(rows.iter().cloned().map(Value::Object).collect()),
    );
    to_text(&object)
}

fn row_text(description: &str, row: &Row) -> Result<String> {
    let mut object = Map::with_capacity(row.len() + 1);
    object.insert(DESCRIPTION_KEY.to_string(), Value::from(description));
    object.extend(row.iter().map(|(column, value)| (column.clone(), value.clone())));
    to_text(&object)
}

fn to_text(object: &Map<String, Value>) -> Result<String> {
    serde_json::to_string(object)
        .map_err(|e| RagError::Ingestion(format!("Failed to serialize chunk: {}", e)))
}
