use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tabular_rag::commands::{IngestOverrides, ask, ingest, show_status, sql};
use tabular_rag::config::{Config, run_interactive_config, show_config};
use tabular_rag::ingestion::ChunkMode;

#[derive(Parser)]
#[command(name = "tabular-rag")]
#[command(about = "Ask questions about tabular statistics through vector retrieval or SQL")]
#[command(version)]
struct Cli {
    /// Configuration directory (defaults to ~/.tabular-rag)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure model endpoints and ingestion settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Embed the files listed in the descriptor document into the vector store
    Ingest {
        /// Rows to read per file (0 reads all)
        #[arg(long)]
        limit: Option<usize>,
        /// Rows per chunking batch
        #[arg(long)]
        batch_size: Option<usize>,
        /// Embed one chunk per row or per batch
        #[arg(long)]
        chunk_mode: Option<ChunkMode>,
        /// Add to the existing collection instead of recreating it
        #[arg(long)]
        append: bool,
    },
    /// Answer a question from the vector store (reads stdin when no question is given)
    Ask {
        question: Option<String>,
        /// Number of chunks to retrieve
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Answer a question by querying the SQL database (reads stdin when no question is given)
    Sql { question: Option<String> },
    /// Show configured stores and their contents
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => Config::config_dir()?,
    };

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&Config::load_with_env(&config_dir)?)?;
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
        Commands::Ingest {
            limit,
            batch_size,
            chunk_mode,
            append,
        } => {
            let overrides = IngestOverrides {
                row_limit: limit,
                batch_size,
                chunk_mode,
                append,
            };
            ingest(&Config::load_with_env(&config_dir)?, &overrides).await?;
        }
        Commands::Ask { question, top_k } => {
            ask(&Config::load_with_env(&config_dir)?, question, top_k).await?;
        }
        Commands::Sql { question } => {
            sql(&Config::load_with_env(&config_dir)?, question).await?;
        }
        Commands::Status => {
            show_status(&Config::load_with_env(&config_dir)?).await?;
        }
    }

    Ok(())
}
