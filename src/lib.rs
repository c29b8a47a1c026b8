use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Chat completion error: {0}")]
    Chat(String),

    #[error("Rerank error: {0}")]
    Rerank(String),

    #[error("Unsupported file format: {0} (expected .csv, .xlsx or .xls)")]
    UnsupportedFormat(String),

    #[error("Vector dimension mismatch: collection expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Distance metric mismatch: collection indexed with {collection}, query uses {requested}")]
    MetricMismatch {
        collection: database::lancedb::DistanceMetric,
        requested: database::lancedb::DistanceMetric,
    },

    #[error("Field '{field}' is {length} characters long, maximum is {max}")]
    TextTooLong {
        field: &'static str,
        length: usize,
        max: usize,
    },

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Ingestion error: {0}")]
    Ingestion(String),

    #[error("SQL error: {0}")]
    Sql(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod agents;
pub mod commands;
pub mod config;
pub mod database;
pub mod ingestion;
pub mod models;
