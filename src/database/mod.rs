// Database module
// LanceDB for chunk vectors, SQLite for the text-to-SQL relational store

pub mod lancedb;
pub mod sqlite;

pub use self::lancedb::{DistanceMetric, OversizePolicy, VectorRecord, VectorStore};
pub use sqlite::SqlDatabase;
