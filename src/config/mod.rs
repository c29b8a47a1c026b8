// Configuration management module
// Application settings (TOML + environment) and dataset descriptor loading

pub mod descriptors;
pub mod interactive;
pub mod settings;

#[cfg(test)]
mod tests;

pub use descriptors::{DatasetDescriptor, read_file_descriptions};
pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    ChatConfig, Config, ConfigError, EmbeddingConfig, IngestionConfig, RagConfig, RerankConfig,
    SqlConfig, VectorStoreConfig,
};

