
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::database::lancedb::{DistanceMetric, OversizePolicy};
use crate::ingestion::chunking::ChunkMode;

pub const DEFAULT_SYSTEM_ROLE: &str = "You are a data analyst answering questions about tourism statistics. \
Each question comes with search results retrieved from tabular datasets, serialized as JSON rows \
together with a description of the dataset they belong to. Answer using only those search results. \
If the results do not contain the answer, say that you do not know.";

pub const DEFAULT_ANSWER_TEMPLATE: &str = "Given the following user question, corresponding SQL query, \
and SQL result, answer the user question.\n\n\
Question: {question}\n\
SQL Query: {query}\n\
SQL Result: {result}\n\
Answer: ";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub embeddings: EmbeddingConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub rag: RagConfig,
    #[serde(default)]
    pub sql: SqlConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank: Option<RerankConfig>,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Chat completion service settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChatConfig {
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Setting an API version switches requests to the Azure deployment layout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub retry_attempts: u32,
    pub timeout_seconds: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            api_key: None,
            api_version: None,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            max_tokens: 1024,
            retry_attempts: 3,
            timeout_seconds: 120,
        }
    }
}

/// Embedding service settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    pub model: String,
    /// Must match the dimension the collection was created with
    pub dimension: u32,
    pub retry_attempts: u32,
    pub timeout_seconds: u64,
    /// Number of embedding requests allowed in flight during ingestion
    pub concurrency: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            api_key: None,
            api_version: None,
            model: "text-embedding-3-small".to_string(),
            dimension: 1536,
            retry_attempts: 1,
            timeout_seconds: 30,
            concurrency: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VectorStoreConfig {
    /// LanceDB URI; defaults to `<config dir>/vectors`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    pub collection: String,
    pub metric: DistanceMetric,
    pub max_text_length: usize,
    pub oversize_policy: OversizePolicy,
    /// Passed to LanceDB as storage options (object store credentials)
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub storage_options: BTreeMap<String, String>,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            uri: None,
            collection: "tourism_statistics".to_string(),
            metric: DistanceMetric::L2,
            max_text_length: 16384,
            oversize_policy: OversizePolicy::Truncate,
            storage_options: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestionConfig {
    pub data_dir: PathBuf,
    pub descriptors_file: PathBuf,
    /// WHATWG encoding label used to decode CSV files
    pub csv_encoding: String,
    pub csv_separator: char,
    /// Maximum rows read per file, 0 reads everything
    pub row_limit: usize,
    pub batch_size: usize,
    pub chunk_mode: ChunkMode,
    pub insert_batch_size: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            descriptors_file: PathBuf::from("file_descriptions.yaml"),
            csv_encoding: "utf-8".to_string(),
            csv_separator: ',',
            row_limit: 0,
            batch_size: 25,
            chunk_mode: ChunkMode::Batch,
            insert_batch_size: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    pub system_role: String,
    pub top_k: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            system_role: DEFAULT_SYSTEM_ROLE.to_string(),
            top_k: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SqlConfig {
    pub database_path: PathBuf,
    /// Row limit suggested to the model when it writes queries
    pub top_k: usize,
    /// Placeholders: `{question}`, `{query}`, `{result}`
    pub answer_template: String,
}

impl Default for SqlConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("tourism.db"),
            top_k: 5,
            answer_template: DEFAULT_ANSWER_TEMPLATE.to_string(),
        }
    }
}

/// External re-ranking model, disabled unless present
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RerankConfig {
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_n: Option<usize>,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.cohere.com/v2".to_string(),
            api_key: None,
            model: "rerank-v3.5".to_string(),
            top_n: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid temperature: {0} (must be between 0.0 and 2.0)")]
    InvalidTemperature(f32),
    #[error("Invalid max tokens: {0} (must be between 1 and 131072)")]
    InvalidMaxTokens(u32),
    #[error("Invalid retry attempts: {0} (must be between 1 and 10)")]
    InvalidRetryAttempts(u32),
    #[error("Invalid timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid embedding dimension: {0} (must be between 2 and 8192)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid embedding concurrency: {0} (must be between 1 and 64)")]
    InvalidConcurrency(usize),
    #[error("Invalid collection name: '{0}' (letters, digits, '_' and '-' only)")]
    InvalidCollectionName(String),
    #[error("Invalid max text length: {0} (must be between 64 and 65535)")]
    InvalidMaxTextLength(usize),
    #[error("Invalid batch size: {0} (must be between 1 and 10000)")]
    InvalidBatchSize(usize),
    #[error("Invalid insert batch size: {0} (must be between 1 and 10000)")]
    InvalidInsertBatchSize(usize),
    #[error("Invalid CSV separator: {0:?} (must be a single ASCII character other than quote or newline)")]
    InvalidSeparator(char),
    #[error("Unknown CSV encoding label: {0}")]
    InvalidEncoding(String),
    #[error("Invalid top-k: {0} (must be between 1 and 1000)")]
    InvalidTopK(usize),
    #[error("Invalid value for {var}: {value}")]
    InvalidEnvValue { var: &'static str, value: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Default configuration directory, `~/.tabular-rag`
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".tabular-rag"))
            .or_else(|| dirs::data_dir().map(|data| data.join("tabular-rag")))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    /// Load `.env` files, the TOML file, then apply environment overrides
    #[inline]
    pub fn load_with_env<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let env_file = config_dir.as_ref().join(".env");
        if env_file.exists() {
            dotenvy::from_path(&env_file)
                .with_context(|| format!("Failed to load {}", env_file.display()))?;
        }
        // A missing .env in the working directory is not an error
        let _ = dotenvy::dotenv();

        let mut config = Self::load(config_dir)?;
        config.apply_env_overrides()?;
        config
            .validate()
            .context("Configuration validation failed after environment overrides")?;
        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a variable lookup, using the variable names of the
    /// original `.env` layout
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("OPENAI_MODEL") {
            self.chat.model = model;
        }
        if let Some(base) = lookup("OPENAI_API_BASE") {
            self.chat.endpoint.clone_from(&base);
            self.embeddings.endpoint = base;
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.chat.api_key = Some(key.clone());
            self.embeddings.api_key = Some(key);
        }
        if let Some(version) = lookup("OPENAI_API_VERSION") {
            self.chat.api_version = Some(version.clone());
            self.embeddings.api_version = Some(version);
        }
        if let Some(value) = lookup("TEMPERATURE") {
            self.chat.temperature = parse_env("TEMPERATURE", &value)?;
        }
        if let Some(value) = lookup("MAX_TOKENS") {
            self.chat.max_tokens = parse_env("MAX_TOKENS", &value)?;
        }
        if let Some(model) = lookup("EMBEDDINGS_MODEL") {
            self.embeddings.model = model;
        }
        if let Some(value) = lookup("EMBEDDING_DIM") {
            self.embeddings.dimension = parse_env("EMBEDDING_DIM", &value)?;
        }
        if let Some(uri) = lookup("VECTORDB_URI") {
            self.vector_store.uri = Some(uri);
        }
        if let Some(token) = lookup("VECTORDB_TOKEN") {
            self.vector_store
                .storage_options
                .insert("api_key".to_string(), token);
        }
        if let Some(name) = lookup("COLLECTION_NAME") {
            self.vector_store.collection = name;
        }
        if let Some(dir) = lookup("DATA_DIRECTORY") {
            self.ingestion.data_dir = PathBuf::from(dir);
        }
        if let Some(file) = lookup("FILE_DESCRIPTIONS") {
            self.ingestion.descriptors_file = PathBuf::from(file);
        }
        if let Some(codec) = lookup("CSV_CODEC") {
            self.ingestion.csv_encoding = codec;
        }
        if let Some(sep) = lookup("CSV_SEP") {
            let mut chars = sep.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => self.ingestion.csv_separator = c,
                _ => {
                    return Err(ConfigError::InvalidEnvValue {
                        var: "CSV_SEP",
                        value: sep,
                    });
                }
            }
        }
        if let Some(path) = lookup("SQLDB_PATH") {
            self.sql.database_path = PathBuf::from(path);
        }
        if let Some(model) = lookup("RERANK_MODEL") {
            self.rerank.get_or_insert_with(RerankConfig::default).model = model;
        }
        if let Some(key) = lookup("RERANK_API_KEY") {
            self.rerank.get_or_insert_with(RerankConfig::default).api_key = Some(key);
        }
        Ok(())
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chat.validate()?;
        self.embeddings.validate()?;
        self.vector_store.validate()?;
        self.ingestion.validate()?;

        if !(1..=1000).contains(&self.rag.top_k) {
            return Err(ConfigError::InvalidTopK(self.rag.top_k));
        }
        if !(1..=1000).contains(&self.sql.top_k) {
            return Err(ConfigError::InvalidTopK(self.sql.top_k));
        }

        if let Some(rerank) = &self.rerank {
            parse_endpoint(&rerank.endpoint)?;
            if rerank.model.trim().is_empty() {
                return Err(ConfigError::InvalidModel(rerank.model.clone()));
            }
        }

        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// LanceDB URI, either configured or a local directory under the base dir
    #[inline]
    pub fn vector_store_uri(&self) -> String {
        self.vector_store.uri.clone().unwrap_or_else(|| {
            self.get_base_dir()
                .join("vectors")
                .to_string_lossy()
                .into_owned()
        })
    }

    #[inline]
    pub fn data_dir(&self) -> PathBuf {
        self.resolve(&self.ingestion.data_dir)
    }

    #[inline]
    pub fn descriptors_path(&self) -> PathBuf {
        self.resolve(&self.ingestion.descriptors_file)
    }

    #[inline]
    pub fn sql_database_path(&self) -> PathBuf {
        self.resolve(&self.sql.database_path)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.get_base_dir().join(path)
        }
    }
}

impl ChatConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_endpoint(&self.endpoint)?;

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidTemperature(self.temperature));
        }

        if !(1..=131_072).contains(&self.max_tokens) {
            return Err(ConfigError::InvalidMaxTokens(self.max_tokens));
        }

        validate_transport(self.retry_attempts, self.timeout_seconds)
    }

    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        parse_endpoint(&self.endpoint)
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_endpoint(&self.endpoint)?;

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if !(2..=8192).contains(&self.dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(self.dimension));
        }

        if !(1..=64).contains(&self.concurrency) {
            return Err(ConfigError::InvalidConcurrency(self.concurrency));
        }

        validate_transport(self.retry_attempts, self.timeout_seconds)
    }

    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        parse_endpoint(&self.endpoint)
    }

    pub fn set_dimension(&mut self, dimension: u32) -> Result<(), ConfigError> {
        if !(2..=8192).contains(&dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(dimension));
        }
        self.dimension = dimension;
        Ok(())
    }
}

impl VectorStoreConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_name = !self.collection.is_empty()
            && self
                .collection
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid_name {
            return Err(ConfigError::InvalidCollectionName(self.collection.clone()));
        }

        if !(64..=65535).contains(&self.max_text_length) {
            return Err(ConfigError::InvalidMaxTextLength(self.max_text_length));
        }

        Ok(())
    }
}

impl IngestionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=10_000).contains(&self.batch_size) {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(1..=10_000).contains(&self.insert_batch_size) {
            return Err(ConfigError::InvalidInsertBatchSize(self.insert_batch_size));
        }

        let sep = self.csv_separator;
        if !sep.is_ascii() || matches!(sep, '"' | '\n' | '\r') {
            return Err(ConfigError::InvalidSeparator(sep));
        }

        if encoding_rs::Encoding::for_label(self.csv_encoding.as_bytes()).is_none() {
            return Err(ConfigError::InvalidEncoding(self.csv_encoding.clone()));
        }

        Ok(())
    }

    pub fn set_separator(&mut self, separator: char) -> Result<(), ConfigError> {
        if !separator.is_ascii() || matches!(separator, '"' | '\n' | '\r') {
            return Err(ConfigError::InvalidSeparator(separator));
        }
        self.csv_separator = separator;
        Ok(())
    }

    pub fn set_batch_size(&mut self, batch_size: usize) -> Result<(), ConfigError> {
        if !(1..=10_000).contains(&batch_size) {
            return Err(ConfigError::InvalidBatchSize(batch_size));
        }
        self.batch_size = batch_size;
        Ok(())
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(endpoint).map_err(|_| ConfigError::InvalidUrl(endpoint.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(endpoint.to_string()));
    }
    Ok(url)
}

fn validate_transport(retry_attempts: u32, timeout_seconds: u64) -> Result<(), ConfigError> {
    if !(1..=10).contains(&retry_attempts) {
        return Err(ConfigError::InvalidRetryAttempts(retry_attempts));
    }
    if !(1..=600).contains(&timeout_seconds) {
        return Err(ConfigError::InvalidTimeout(timeout_seconds));
    }
    Ok(())
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnvValue {
            var,
            value: value.to_string(),
        })
}
