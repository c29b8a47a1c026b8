#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

//! End-to-end runs through the command layer against mocked model endpoints

use anyhow::Result;
use serde_json::json;
use tabular_rag::agents::{Conversation, RagAgent, SearchParams};
use tabular_rag::commands::{IngestOverrides, ingest, open_vector_store};
use tabular_rag::config::{ChatConfig, Config, EmbeddingConfig};
use tabular_rag::database::lancedb::DistanceMetric;
use tabular_rag::models::ModelProvider;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(temp_dir: &TempDir, server: &MockServer) -> Config {
    let endpoint = format!("{}/v1", server.uri());
    let mut config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        chat: ChatConfig {
            endpoint: endpoint.clone(),
            model: "gpt-4o-mini".to_string(),
            retry_attempts: 1,
            ..ChatConfig::default()
        },
        embeddings: EmbeddingConfig {
            endpoint,
            model: "text-embedding-3-small".to_string(),
            dimension: 3,
            retry_attempts: 1,
            ..EmbeddingConfig::default()
        },
        ..Config::default()
    };
    config.ingestion.batch_size = 10;
    config
}

fn write_dataset(temp_dir: &TempDir) -> Result<()> {
    let data_dir = temp_dir.path().join("data");
    std::fs::create_dir_all(&data_dir)?;
    std::fs::write(
        data_dir.join("overnight_stays.csv"),
        "region,year,nights\nAlgarve,2019,17.6\nLisboa,2019,16.8\nNorte,2019,10.2\n",
    )?;
    std::fs::write(
        temp_dir.path().join("file_descriptions.yaml"),
        "files:\n  - filename: overnight_stays.csv\n    description: Overnight stays per region in millions\n",
    )?;
    Ok(())
}

async fn mount_embeddings(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"index": 0, "embedding": [0.3, 0.4, 0.5]}]
        })))
        .mount(server)
        .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn ingest_then_answer_from_retrieved_chunk() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let server = MockServer::start().await;
    write_dataset(&temp_dir)?;
    mount_embeddings(&server).await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("Algarve"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "The Algarve had 17.6 million nights."}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(&temp_dir, &server);
    let report = ingest(&config, &IngestOverrides::default()).await?;
    assert_eq!(report.rows, 3);
    assert_eq!(report.records_inserted, 1);

    let provider = ModelProvider::from_config(&config)?;
    let mut store = open_vector_store(&config).await?;
    let info = store
        .load_collection(&config.vector_store.collection)
        .await?;
    assert_eq!(info.dimension, 3);
    assert_eq!(info.metric, DistanceMetric::L2);

    let agent = RagAgent::new(
        store,
        config.vector_store.collection.clone(),
        config.rag.system_role.as_str(),
        provider.embeddings,
        provider.chat,
    );
    let params = SearchParams {
        top_k: 3,
        metric: DistanceMetric::L2,
    };
    let (answer, conversation) = agent
        .respond(
            "Which region had the most overnight stays?",
            &params,
            Conversation::new(),
        )
        .await?;

    assert_eq!(answer, "The Algarve had 17.6 million nights.");
    assert_eq!(conversation.len(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn append_keeps_previous_records() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let server = MockServer::start().await;
    write_dataset(&temp_dir)?;
    mount_embeddings(&server).await;
    let config = test_config(&temp_dir, &server);

    ingest(&config, &IngestOverrides::default()).await?;
    let appended = IngestOverrides {
        chunk_mode: Some(tabular_rag::ingestion::ChunkMode::Row),
        append: true,
        ..IngestOverrides::default()
    };
    ingest(&config, &appended).await?;

    let store = open_vector_store(&config).await?;
    assert_eq!(store.count(&config.vector_store.collection).await?, 4);

    ingest(&config, &IngestOverrides::default()).await?;
    let store = open_vector_store(&config).await?;
    assert_eq!(store.count(&config.vector_store.collection).await?, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn embedding_outage_fails_the_run() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let server = MockServer::start().await;
    write_dataset(&temp_dir)?;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let config = test_config(&temp_dir, &server);

    let result = ingest(&config, &IngestOverrides::default()).await;

    assert!(result.is_err());
    let store = open_vector_store(&config).await?;
    assert_eq!(store.count(&config.vector_store.collection).await?, 0);
    Ok(())
}
