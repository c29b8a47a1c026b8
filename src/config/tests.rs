use super::*;
use serial_test::serial;
use std::fs;
use tempfile::TempDir;

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn config_file_persistence() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        let config_path = temp_dir.path().join("config.toml");

        let mut original_config = Config::default();
        original_config.chat.model = "gpt-4o".to_string();
        original_config.embeddings.dimension = 768;
        original_config.ingestion.csv_separator = ';';

        let toml_content = toml::to_string_pretty(&original_config)
            .expect("config should convert to toml string successfully");
        fs::write(&config_path, toml_content).expect("should write to config_path successfully");

        let content =
            fs::read_to_string(&config_path).expect("should read from config_path successfully");
        let loaded_config: Config = toml::from_str(&content).expect("should parse toml correctly");

        assert_eq!(original_config, loaded_config);
    }

    #[test]
    fn invalid_toml_handling() {
        let invalid_toml = r#"
            [chat
            model = "gpt-4o"
            max_tokens = "many"
        "#;

        let result: Result<Config, toml::de::Error> = toml::from_str(invalid_toml);
        assert!(result.is_err());
    }

    #[test]
    fn invalid_values_fail_load() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        fs::write(
            temp_dir.path().join("config.toml"),
            "[embeddings]\ndimension = 1\n",
        )
        .expect("should write config");

        let result = Config::load(temp_dir.path());
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn environment_overrides_from_process() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");

        // SAFETY: serialized with other environment tests
        unsafe {
            std::env::set_var("COLLECTION_NAME", "env_collection");
            std::env::set_var("EMBEDDING_DIM", "384");
        }

        let config = Config::load_with_env(temp_dir.path());

        // SAFETY: serialized with other environment tests
        unsafe {
            std::env::remove_var("COLLECTION_NAME");
            std::env::remove_var("EMBEDDING_DIM");
        }

        let config = config.expect("should load config with env overrides");
        assert_eq!(config.vector_store.collection, "env_collection");
        assert_eq!(config.embeddings.dimension, 384);
    }

    #[test]
    #[serial]
    fn env_file_in_config_dir() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        fs::write(
            temp_dir.path().join(".env"),
            "CSV_CODEC=latin1\nCSV_SEP=;\n",
        )
        .expect("should write .env");

        let config = Config::load_with_env(temp_dir.path());

        // SAFETY: serialized with other environment tests
        unsafe {
            std::env::remove_var("CSV_CODEC");
            std::env::remove_var("CSV_SEP");
        }

        let config = config.expect("should load config with .env");
        assert_eq!(config.ingestion.csv_encoding, "latin1");
        assert_eq!(config.ingestion.csv_separator, ';');
    }

    #[test]
    fn error_display_messages() {
        let errors = vec![
            ConfigError::InvalidUrl("invalid-url".to_string()),
            ConfigError::InvalidModel(String::new()),
            ConfigError::InvalidBatchSize(0),
            ConfigError::InvalidSeparator('"'),
            ConfigError::InvalidEncoding("klingon".to_string()),
            ConfigError::InvalidEmbeddingDimension(0),
        ];

        for error in errors {
            let message = format!("{error}");
            assert!(!message.is_empty());
            assert!(message.len() > 10);
        }
    }
}
