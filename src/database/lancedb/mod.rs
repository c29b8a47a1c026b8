// LanceDB vector database module
// Fixed-schema collections of embedded table chunks


pub mod vector_store;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use vector_store::{FetchedRecord, RecordField, SearchHit, VectorStore};

/// Maximum characters stored in the `source` column
pub const SOURCE_MAX_LENGTH: usize = 100;
/// Maximum characters stored in the `description` column
pub const DESCRIPTION_MAX_LENGTH: usize = 1024;

/// A chunk ready to be stored; `row_id` is assigned by the store on insert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Index of the row batch the chunk came from
    pub batch: i64,
    /// Source file name without extension
    pub source: String,
    /// Serialized chunk text
    pub text: String,
    /// Dataset description attached to the source file
    pub description: String,
    pub vector: Vec<f32>,
}

/// Distance used both for the collection and for every query against it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Squared Euclidean distance
    #[default]
    L2,
    Cosine,
}

impl DistanceMetric {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::L2 => "l2",
            Self::Cosine => "cosine",
        }
    }

    #[inline]
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "l2" | "euclidean" => Some(Self::L2),
            "cosine" => Some(Self::Cosine),
            _ => None,
        }
    }
}

impl fmt::Display for DistanceMetric {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<DistanceMetric> for ::lancedb::DistanceType {
    #[inline]
    fn from(metric: DistanceMetric) -> Self {
        match metric {
            DistanceMetric::L2 => Self::L2,
            DistanceMetric::Cosine => Self::Cosine,
        }
    }
}

/// What to do with a bounded text field that is too long
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OversizePolicy {
    /// Cut at the bound on a character boundary
    #[default]
    Truncate,
    /// Fail the insert with `TextTooLong`
    Reject,
}
