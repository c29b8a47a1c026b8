// Tabular ingestion module
// Loads descriptor-listed files, chunks their rows, embeds the chunks and stores the vectors

pub mod chunking;
pub mod loader;


use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{StreamExt, TryStreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::config::{Config, DatasetDescriptor};
use crate::database::lancedb::{DistanceMetric, VectorRecord, VectorStore};
use crate::models::EmbeddingModel;
use crate::{RagError, Result};

pub use chunking::{Chunk, ChunkMode, build_chunks};
pub use loader::{TabularLoader, Table};

/// Parameters of one ingestion run
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOptions {
    pub collection: String,
    pub dimension: usize,
    pub metric: DistanceMetric,
    /// Drop and recreate the collection before inserting
    pub reset: bool,
    /// Rows read per file; 0 reads everything
    pub row_limit: usize,
    pub batch_size: usize,
    pub chunk_mode: ChunkMode,
    pub insert_batch_size: usize,
    pub embedding_concurrency: usize,
    pub show_progress: bool,
}

impl IngestOptions {
    #[inline]
    pub fn from_config(config: &Config) -> Self {
        Self {
            collection: config.vector_store.collection.clone(),
            dimension: config.embeddings.dimension as usize,
            metric: config.vector_store.metric,
            reset: true,
            row_limit: config.ingestion.row_limit,
            batch_size: config.ingestion.batch_size,
            chunk_mode: config.ingestion.chunk_mode,
            insert_batch_size: config.ingestion.insert_batch_size,
            embedding_concurrency: config.embeddings.concurrency,
            show_progress: console::user_attended_stderr(),
        }
    }
}

/// Outcome of an ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestionReport {
    pub files: usize,
    pub rows: usize,
    pub chunks: usize,
    pub records_inserted: usize,
    pub elapsed: Duration,
}

/// Drives files through loading, chunking, embedding and storage
pub struct Ingestor {
    embedder: Arc<dyn EmbeddingModel>,
    loader: TabularLoader,
    data_dir: PathBuf,
}

impl std::fmt::Debug for Ingestor {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ingestor")
            .field("loader", &self.loader)
            .field("data_dir", &self.data_dir)
            .finish_non_exhaustive()
    }
}

impl Ingestor {
    #[inline]
    pub fn new(embedder: Arc<dyn EmbeddingModel>, loader: TabularLoader, data_dir: PathBuf) -> Self {
        Self {
            embedder,
            loader,
            data_dir,
        }
    }

    /// Ingest every descriptor's file into the collection named in `options`.
    /// Any load or embedding failure aborts the run. File formats and the embedding
    /// width are checked before the collection is touched.
    #[inline]
    pub async fn ingest(
        &self,
        store: &mut VectorStore,
        descriptors: &[DatasetDescriptor],
        options: &IngestOptions,
    ) -> Result<IngestionReport> {
        let start = Instant::now();
        if options.insert_batch_size == 0 {
            return Err(RagError::Ingestion(
                "Insert batch size must be positive".to_string(),
            ));
        }

        if self.embedder.dimension() != options.dimension {
            return Err(RagError::DimensionMismatch {
                expected: options.dimension,
                actual: self.embedder.dimension(),
            });
        }

        let paths: Vec<PathBuf> = descriptors
            .iter()
            .map(|d| d.path_in(&self.data_dir))
            .collect();
        for path in &paths {
            TabularLoader::check_supported(path)?;
        }

        if options.reset {
            store
                .create_collection(&options.collection, options.dimension, options.metric)
                .await?;
        } else {
            store
                .ensure_collection(&options.collection, options.dimension, options.metric)
                .await?;
        }

        let bar = if options.show_progress {
            ProgressBar::new(0).with_style(
                ProgressStyle::with_template("{bar:40} [{pos}/{len}] Embedding {msg}")
                    .expect("style template is valid"),
            )
        } else {
            ProgressBar::hidden()
        };

        let mut report = IngestionReport::default();
        let mut pending: Vec<VectorRecord> = Vec::with_capacity(options.insert_batch_size);

        for (descriptor, path) in descriptors.iter().zip(&paths) {
            let table = self.loader.load(path, options.row_limit)?;
            info!("File read: {} ({} rows)", table.name, table.rows.len());

            let chunks = build_chunks(
                &table,
                &descriptor.description,
                options.batch_size,
                options.chunk_mode,
            )?;
            bar.inc_length(chunks.len() as u64);
            bar.set_message(table.name.clone());

            let vectors = self
                .embed_chunks(&chunks, options.embedding_concurrency, &bar)
                .await?;

            report.files += 1;
            report.rows += table.rows.len();
            report.chunks += chunks.len();

            for (chunk, vector) in chunks.into_iter().zip(vectors) {
                pending.push(VectorRecord {
                    batch: chunk.batch_index as i64,
                    source: chunk.source,
                    text: chunk.text,
                    description: chunk.description,
                    vector,
                });

                if pending.len() >= options.insert_batch_size {
                    report.records_inserted += store
                        .insert(&options.collection, std::mem::take(&mut pending))
                        .await?
                        .len();
                }
            }
        }

        if !pending.is_empty() {
            debug!("Inserting trailing batch of {} records", pending.len());
            report.records_inserted += store.insert(&options.collection, pending).await?.len();
        }
        bar.finish_and_clear();

        report.elapsed = start.elapsed();
        info!(
            "Ingested {} files, {} rows, {} chunks, {} records in {:.1?}",
            report.files, report.rows, report.chunks, report.records_inserted, report.elapsed
        );
        Ok(report)
    }

    /// One embedding request per chunk, at most `concurrency` in flight, results in chunk order
    async fn embed_chunks(
        &self,
        chunks: &[Chunk],
        concurrency: usize,
        bar: &ProgressBar,
    ) -> Result<Vec<Vec<f32>>> {
        futures::stream::iter(chunks)
            .map(|chunk| async move {
                let vector = self.embedder.embed(&chunk.text).await;
                bar.inc(1);
                vector
            })
            .buffered(concurrency.max(1))
            .try_collect()
            .await
    }
}
