
use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};

use super::{ChatConfig, Config, EmbeddingConfig, IngestionConfig};
use crate::database::lancedb::DistanceMetric;

#[inline]
pub fn run_interactive_config(config_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 Tabular RAG Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_dir)?;

    eprintln!("{}", style("Chat Model").bold().yellow());
    configure_chat(&mut config.chat)?;

    eprintln!();
    eprintln!("{}", style("Embedding Model").bold().yellow());
    eprintln!("The dimension must match the vector collection; changing it requires re-ingestion.");
    configure_embeddings(&mut config.embeddings)?;

    eprintln!();
    eprintln!("{}", style("Vector Store & Ingestion").bold().yellow());
    configure_ingestion(&mut config)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if test_endpoint(&config.embeddings.endpoint) {
        eprintln!("{}", style("✓ Embedding endpoint reachable!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not reach the embedding endpoint").yellow()
        );
        eprintln!("You can continue, but ingestion and questions will fail until it is reachable.");
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config: &Config) -> Result<()> {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Chat:").bold().yellow());
    eprintln!("  Endpoint: {}", style(&config.chat.endpoint).cyan());
    eprintln!("  Model: {}", style(&config.chat.model).cyan());
    eprintln!("  Temperature: {}", style(config.chat.temperature).cyan());
    eprintln!("  Max Tokens: {}", style(config.chat.max_tokens).cyan());
    eprintln!("  API Key: {}", style(mask(config.chat.api_key.as_deref())).dim());
    if let Some(version) = &config.chat.api_version {
        eprintln!("  API Version: {}", style(version).cyan());
    }

    eprintln!();
    eprintln!("{}", style("Embeddings:").bold().yellow());
    eprintln!("  Endpoint: {}", style(&config.embeddings.endpoint).cyan());
    eprintln!("  Model: {}", style(&config.embeddings.model).cyan());
    eprintln!("  Dimension: {}", style(config.embeddings.dimension).cyan());
    eprintln!("  Concurrency: {}", style(config.embeddings.concurrency).cyan());

    eprintln!();
    eprintln!("{}", style("Vector Store:").bold().yellow());
    eprintln!("  URI: {}", style(config.vector_store_uri()).cyan());
    eprintln!("  Collection: {}", style(&config.vector_store.collection).cyan());
    eprintln!("  Metric: {}", style(config.vector_store.metric).cyan());
    eprintln!(
        "  Max Text Length: {} ({:?})",
        style(config.vector_store.max_text_length).cyan(),
        config.vector_store.oversize_policy
    );

    eprintln!();
    eprintln!("{}", style("Ingestion:").bold().yellow());
    eprintln!("  Data Directory: {}", style(config.data_dir().display()).cyan());
    eprintln!(
        "  Descriptors: {}",
        style(config.descriptors_path().display()).cyan()
    );
    eprintln!(
        "  CSV: encoding {}, separator {:?}",
        style(&config.ingestion.csv_encoding).cyan(),
        config.ingestion.csv_separator
    );
    eprintln!(
        "  Batch Size: {} ({} mode), insert batch {}",
        style(config.ingestion.batch_size).cyan(),
        config.ingestion.chunk_mode,
        config.ingestion.insert_batch_size
    );

    eprintln!();
    eprintln!("{}", style("SQL:").bold().yellow());
    eprintln!(
        "  Database: {}",
        style(config.sql_database_path().display()).cyan()
    );

    if let Some(rerank) = &config.rerank {
        eprintln!();
        eprintln!("{}", style("Re-ranking:").bold().yellow());
        eprintln!("  Endpoint: {}", style(&rerank.endpoint).cyan());
        eprintln!("  Model: {}", style(&rerank.model).cyan());
    }

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config(config_dir: &Path) -> Result<Config> {
    if config_dir.join("config.toml").exists() {
        let config = Config::load(config_dir)?;
        eprintln!("{}", style("Found existing configuration.").green());
        Ok(config)
    } else {
        eprintln!(
            "{}",
            style("No existing configuration found. Using defaults.").yellow()
        );
        Ok(Config {
            base_dir: config_dir.to_path_buf(),
            ..Config::default()
        })
    }
}

fn configure_chat(chat: &mut ChatConfig) -> Result<()> {
    let endpoint: String = Input::new()
        .with_prompt("Chat API endpoint")
        .default(chat.endpoint.clone())
        .validate_with(|input: &String| -> Result<(), String> {
            let candidate = ChatConfig {
                endpoint: input.clone(),
                ..ChatConfig::default()
            };
            candidate.endpoint_url().map(|_| ()).map_err(|e| e.to_string())
        })
        .interact_text()?;

    let model: String = Input::new()
        .with_prompt("Chat model")
        .default(chat.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let temperature: f32 = Input::new()
        .with_prompt("Temperature")
        .default(chat.temperature)
        .validate_with(|input: &f32| -> Result<(), &str> {
            if (0.0..=2.0).contains(input) {
                Ok(())
            } else {
                Err("Temperature must be between 0.0 and 2.0")
            }
        })
        .interact_text()?;

    chat.endpoint = endpoint;
    chat.model = model;
    chat.temperature = temperature;
    Ok(())
}

fn configure_embeddings(embeddings: &mut EmbeddingConfig) -> Result<()> {
    let model: String = Input::new()
        .with_prompt("Embedding model")
        .default(embeddings.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let dimension: u32 = Input::new()
        .with_prompt("Embedding dimension")
        .default(embeddings.dimension)
        .interact_text()?;

    embeddings.model = model;
    embeddings.set_dimension(dimension)?;
    Ok(())
}

fn configure_ingestion(config: &mut Config) -> Result<()> {
    let metrics = [DistanceMetric::L2, DistanceMetric::Cosine];
    let default_index = metrics
        .iter()
        .position(|m| *m == config.vector_store.metric)
        .unwrap_or(0);

    let metric_index = Select::new()
        .with_prompt("Distance metric")
        .default(default_index)
        .items(&metrics)
        .interact()?;

    let collection: String = Input::new()
        .with_prompt("Collection name")
        .default(config.vector_store.collection.clone())
        .interact_text()?;

    let separator: char = Input::new()
        .with_prompt("CSV separator")
        .default(config.ingestion.csv_separator)
        .interact_text()?;

    let batch_size: usize = Input::new()
        .with_prompt("Rows per batch")
        .default(config.ingestion.batch_size)
        .interact_text()?;

    config.vector_store.metric = metrics[metric_index];
    config.vector_store.collection = collection;
    apply_ingestion_answers(&mut config.ingestion, separator, batch_size)?;
    config.validate()?;
    Ok(())
}

fn apply_ingestion_answers(
    ingestion: &mut IngestionConfig,
    separator: char,
    batch_size: usize,
) -> Result<()> {
    ingestion.set_separator(separator)?;
    ingestion.set_batch_size(batch_size)?;
    Ok(())
}

fn mask(secret: Option<&str>) -> String {
    match secret {
        Some(s) if s.chars().count() > 8 => {
            let tail: String = s.chars().skip(s.chars().count() - 4).collect();
            format!("****{}", tail)
        }
        Some(_) => "****".to_string(),
        None => "(not set)".to_string(),
    }
}

fn test_endpoint(endpoint: &str) -> bool {
    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(std::time::Duration::from_secs(5)))
        .build()
        .into();

    match agent.get(endpoint).call() {
        Ok(_) => true,
        // Authentication failures still prove the server is there
        Err(ureq::Error::StatusCode(code)) if (400..500).contains(&code) => true,
        Err(_) => false,
    }
}
