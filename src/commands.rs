use std::io::Write as _;

use anyhow::{Context, Result};
use console::style;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::RagError;
use crate::agents::{Conversation, RagAgent, SearchParams, TextToSqlAgent};
use crate::config::{Config, read_file_descriptions};
use crate::database::lancedb::VectorStore;
use crate::database::sqlite::SqlDatabase;
use crate::ingestion::{ChunkMode, IngestOptions, IngestionReport, Ingestor, TabularLoader};
use crate::models::ModelProvider;

/// Command-line adjustments to a configured ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestOverrides {
    pub row_limit: Option<usize>,
    pub batch_size: Option<usize>,
    pub chunk_mode: Option<ChunkMode>,
    /// Keep the existing collection and add to it
    pub append: bool,
}

impl IngestOverrides {
    #[inline]
    pub fn apply(&self, options: &mut IngestOptions) {
        if let Some(limit) = self.row_limit {
            options.row_limit = limit;
        }
        if let Some(batch_size) = self.batch_size {
            options.batch_size = batch_size;
        }
        if let Some(mode) = self.chunk_mode {
            options.chunk_mode = mode;
        }
        options.reset = !self.append;
    }
}

/// Connect to the configured vector store with its text bounds applied
#[inline]
pub async fn open_vector_store(config: &Config) -> Result<VectorStore> {
    let uri = config.vector_store_uri();
    let store = VectorStore::connect(&uri, &config.vector_store.storage_options)
        .await
        .with_context(|| format!("Failed to open vector store at {}", uri))?;
    Ok(store
        .with_text_limit(
            config.vector_store.max_text_length,
            config.vector_store.oversize_policy,
        )
        .with_default_metric(config.vector_store.metric))
}

/// Embed every file listed in the descriptor document into the collection
#[inline]
pub async fn ingest(config: &Config, overrides: &IngestOverrides) -> Result<IngestionReport> {
    let descriptors_path = config.descriptors_path();
    let descriptors = read_file_descriptions(&descriptors_path)?;
    if descriptors.is_empty() {
        warn!("No files listed in {}", descriptors_path.display());
    }

    let mut options = IngestOptions::from_config(config);
    overrides.apply(&mut options);
    if options.batch_size == 0 {
        anyhow::bail!("Batch size must be at least 1");
    }

    let provider = ModelProvider::from_config(config)?;
    let loader = TabularLoader::new(
        &config.ingestion.csv_encoding,
        config.ingestion.csv_separator,
    )?;
    let mut store = open_vector_store(config).await?;

    info!(
        "Ingesting {} files into {} ({})",
        descriptors.len(),
        options.collection,
        if options.reset { "reset" } else { "append" }
    );
    let ingestor = Ingestor::new(provider.embeddings, loader, config.data_dir());
    let report = ingestor.ingest(&mut store, &descriptors, &options).await?;

    println!("{}", style("Ingestion complete").green().bold());
    println!("  Files:    {}", report.files);
    println!("  Rows:     {}", report.rows);
    println!("  Chunks:   {}", report.chunks);
    println!("  Records:  {}", report.records_inserted);
    println!("  Duration: {:.1?}", report.elapsed);
    println!(
        "  Vectors in {}: {}",
        options.collection,
        store.count(&options.collection).await?
    );

    Ok(report)
}

/// Answer a question from the vector store, or read questions from stdin
#[inline]
pub async fn ask(config: &Config, question: Option<String>, top_k: Option<usize>) -> Result<()> {
    let provider = ModelProvider::from_config(config)?;
    let mut store = open_vector_store(config).await?;
    let collection = config.vector_store.collection.clone();

    match store.load_collection(&collection).await {
        Ok(_) => {}
        Err(RagError::CollectionNotFound(name)) => {
            anyhow::bail!(
                "Collection '{}' does not exist. Run 'tabular-rag ingest' first.",
                name
            );
        }
        Err(e) => return Err(e.into()),
    }

    let agent = RagAgent::new(
        store,
        collection,
        config.rag.system_role.as_str(),
        provider.embeddings,
        provider.chat,
    )
    .with_reranker(provider.reranker);
    let params = SearchParams {
        top_k: top_k.unwrap_or(config.rag.top_k),
        metric: config.vector_store.metric,
    };

    run_session(&SessionAgent::Rag { agent, params }, question).await
}

/// Answer a question by querying the SQL database, or read questions from stdin
#[inline]
pub async fn sql(config: &Config, question: Option<String>) -> Result<()> {
    let provider = ModelProvider::from_config(config)?;
    let database_path = config.sql_database_path();
    if !database_path.exists() {
        anyhow::bail!("SQL database not found at {}", database_path.display());
    }
    let database = SqlDatabase::open(&database_path).await?;

    let agent = TextToSqlAgent::new(
        database,
        provider.chat,
        config.sql.answer_template.as_str(),
        config.sql.top_k,
    );

    run_session(&SessionAgent::Sql(agent), question).await
}

/// Print the configured stores and what they currently hold
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    println!("{}", style("Tabular RAG Status").bold().underlined());
    println!();
    println!("Config file:      {}", config.config_file_path().display());
    println!("Data directory:   {}", config.data_dir().display());

    let descriptors_path = config.descriptors_path();
    match read_file_descriptions(&descriptors_path) {
        Ok(descriptors) => println!(
            "Descriptors:      {} ({} files)",
            descriptors_path.display(),
            descriptors.len()
        ),
        Err(e) => println!(
            "Descriptors:      {} ({})",
            descriptors_path.display(),
            style(e).red()
        ),
    }

    println!();
    println!("{}", style("Vector store").bold());
    println!("  URI:        {}", config.vector_store_uri());
    let collection = &config.vector_store.collection;
    let mut store = open_vector_store(config).await?;
    if store.has_collection(collection).await? {
        let info = store.load_collection(collection).await?;
        println!("  Collection: {}", collection);
        println!("  Dimension:  {}", info.dimension);
        println!("  Metric:     {}", info.metric);
        println!("  Vectors:    {}", store.count(collection).await?);
        if info.dimension != config.embeddings.dimension as usize {
            println!(
                "  {}",
                style(format!(
                    "Configured embedding dimension {} differs from the collection",
                    config.embeddings.dimension
                ))
                .yellow()
            );
        }
    } else {
        println!(
            "  Collection: {} ({})",
            collection,
            style("not created yet").yellow()
        );
    }

    println!();
    println!("{}", style("SQL database").bold());
    let database_path = config.sql_database_path();
    if database_path.exists() {
        let database = SqlDatabase::open(&database_path).await?;
        let tables = database.table_names().await?;
        println!("  Path:   {}", database_path.display());
        println!("  Tables: {}", tables.join(", "));
    } else {
        println!(
            "  Path:   {} ({})",
            database_path.display(),
            style("missing").yellow()
        );
    }

    Ok(())
}

enum SessionAgent {
    Rag {
        agent: RagAgent,
        params: SearchParams,
    },
    Sql(TextToSqlAgent),
}

impl SessionAgent {
    async fn respond(
        &self,
        question: &str,
        conversation: Conversation,
    ) -> crate::Result<(String, Conversation)> {
        match self {
            Self::Rag { agent, params } => agent.respond(question, params, conversation).await,
            Self::Sql(agent) => agent.respond(question, conversation).await,
        }
    }
}

/// Answer one question, or every non-empty stdin line while carrying the conversation
async fn run_session(agent: &SessionAgent, question: Option<String>) -> Result<()> {
    if let Some(question) = question {
        let (answer, _) = agent.respond(&question, Conversation::new()).await?;
        println!("{}", answer);
        return Ok(());
    }

    let interactive = console::user_attended();
    let mut conversation = Conversation::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        if interactive {
            print!("{} ", style(">").cyan().bold());
            std::io::stdout().flush().context("Failed to flush stdout")?;
        }
        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }

        match agent.respond(question, conversation.clone()).await {
            Ok((answer, updated)) => {
                println!("{}", answer);
                conversation = updated;
            }
            Err(e) => {
                eprintln!("{} {}", style("Error:").red().bold(), e);
            }
        }
    }

    info!("Session ended after {} questions", conversation.len());
    Ok(())
}
