
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use arrow::array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatchIterator, StringArray,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use itertools::Itertools;
use lancedb::{
    Connection,
    query::{ExecutableQuery, QueryBase, Select},
};
use tracing::{debug, info, warn};

use super::{DESCRIPTION_MAX_LENGTH, DistanceMetric, OversizePolicy, SOURCE_MAX_LENGTH, VectorRecord};
use crate::{RagError, Result};

/// Schema metadata key holding the metric a collection was created for
const METRIC_METADATA_KEY: &str = "distance_metric";
const DEFAULT_MAX_TEXT_LENGTH: usize = 16384;

/// Columns that can be requested from `fetch_by_ids`. `row_id` is always returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordField {
    Batch,
    Source,
    Text,
    Description,
}

impl RecordField {
    #[inline]
    pub fn column_name(self) -> &'static str {
        match self {
            Self::Batch => "batch",
            Self::Source => "source",
            Self::Text => "text",
            Self::Description => "description",
        }
    }
}

/// A stored record projected onto the requested fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedRecord {
    pub row_id: i64,
    pub batch: Option<i64>,
    pub source: Option<String>,
    pub text: Option<String>,
    pub description: Option<String>,
}

/// Nearest-neighbour result; smaller distance is closer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub row_id: i64,
    pub distance: f32,
}

/// Shape of an open collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionInfo {
    pub dimension: usize,
    pub metric: DistanceMetric,
}

/// LanceDB-backed store of embedded table chunks
pub struct VectorStore {
    connection: Connection,
    max_text_length: usize,
    oversize_policy: OversizePolicy,
    default_metric: DistanceMetric,
    metrics: HashMap<String, DistanceMetric>,
}

impl std::fmt::Debug for VectorStore {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("max_text_length", &self.max_text_length)
            .field("oversize_policy", &self.oversize_policy)
            .field("default_metric", &self.default_metric)
            .finish_non_exhaustive()
    }
}

impl VectorStore {
    /// Connect to a LanceDB database. Local paths are created when missing.
    #[inline]
    pub async fn connect(uri: &str, storage_options: &BTreeMap<String, String>) -> Result<Self> {
        debug!("Connecting to LanceDB at {}", uri);

        if !uri.contains("://") {
            std::fs::create_dir_all(uri).map_err(|e| {
                RagError::Database(format!("Failed to create vector database directory: {}", e))
            })?;
        }

        let mut builder = lancedb::connect(uri);
        for (key, value) in storage_options {
            builder = builder.storage_option(key, value);
        }
        let connection = builder
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to connect to LanceDB: {}", e)))?;

        info!("Connected to vector store at {}", uri);
        Ok(Self {
            connection,
            max_text_length: DEFAULT_MAX_TEXT_LENGTH,
            oversize_policy: OversizePolicy::default(),
            default_metric: DistanceMetric::default(),
            metrics: HashMap::new(),
        })
    }

    #[inline]
    #[must_use]
    pub fn with_text_limit(mut self, max_text_length: usize, policy: OversizePolicy) -> Self {
        self.max_text_length = max_text_length;
        self.oversize_policy = policy;
        self
    }

    /// Metric assumed for collections whose schema carries none
    #[inline]
    #[must_use]
    pub fn with_default_metric(mut self, metric: DistanceMetric) -> Self {
        self.default_metric = metric;
        self
    }

    fn create_schema(dimension: usize, metric: DistanceMetric) -> Arc<Schema> {
        let fields = vec![
            Field::new("row_id", DataType::Int64, false),
            Field::new("batch", DataType::Int64, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("text", DataType::Utf8, false),
            Field::new("description", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension as i32,
                ),
                false,
            ),
        ];
        let metadata = HashMap::from([(
            METRIC_METADATA_KEY.to_string(),
            metric.as_str().to_string(),
        )]);
        Arc::new(Schema::new_with_metadata(fields, metadata))
    }

    #[inline]
    pub async fn has_collection(&self, name: &str) -> Result<bool> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to list tables: {}", e)))?;
        Ok(table_names.iter().any(|t| t == name))
    }

    /// Drop the collection if it exists, then create it empty
    #[inline]
    pub async fn create_collection(
        &mut self,
        name: &str,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<CollectionInfo> {
        if dimension == 0 {
            return Err(RagError::Database(
                "Collection dimension must be positive".to_string(),
            ));
        }

        self.drop_collection(name).await?;

        self.connection
            .create_empty_table(name, Self::create_schema(dimension, metric))
            .execute()
            .await
            .map_err(|e| {
                RagError::Database(format!("Failed to create collection {}: {}", name, e))
            })?;
        self.metrics.insert(name.to_string(), metric);

        info!(
            "Created collection {} ({} dimensions, {} metric)",
            name, dimension, metric
        );
        Ok(CollectionInfo { dimension, metric })
    }

    /// Open the collection when present, create it otherwise
    #[inline]
    pub async fn ensure_collection(
        &mut self,
        name: &str,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<CollectionInfo> {
        if !self.has_collection(name).await? {
            return self.create_collection(name, dimension, metric).await;
        }

        let info = self.load_collection(name).await?;
        if info.dimension != dimension {
            return Err(RagError::DimensionMismatch {
                expected: info.dimension,
                actual: dimension,
            });
        }
        if info.metric != metric {
            return Err(RagError::MetricMismatch {
                collection: info.metric,
                requested: metric,
            });
        }
        Ok(info)
    }

    /// Open an existing collection and detect its dimension and metric
    #[inline]
    pub async fn load_collection(&mut self, name: &str) -> Result<CollectionInfo> {
        let info = self.describe(name).await?;
        self.metrics.insert(name.to_string(), info.metric);
        debug!(
            "Loaded collection {} ({} dimensions, {} metric)",
            name, info.dimension, info.metric
        );
        Ok(info)
    }

    #[inline]
    pub async fn drop_collection(&mut self, name: &str) -> Result<()> {
        if self.has_collection(name).await? {
            info!("Dropping collection {}", name);
            self.connection.drop_table(name).await.map_err(|e| {
                RagError::Database(format!("Failed to drop collection {}: {}", name, e))
            })?;
        }
        self.metrics.remove(name);
        Ok(())
    }

    #[inline]
    pub async fn count(&self, name: &str) -> Result<usize> {
        let table = self.open_table(name).await?;
        table
            .count_rows(None)
            .await
            .map_err(|e| RagError::Database(format!("Failed to count rows: {}", e)))
    }

    /// Insert records, returning the row ids assigned to them in order
    #[inline]
    pub async fn insert(&self, name: &str, records: Vec<VectorRecord>) -> Result<Vec<i64>> {
        if records.is_empty() {
            debug!("No records to insert");
            return Ok(Vec::new());
        }

        let info = self.describe(name).await?;
        if let Some(bad) = records.iter().find(|r| r.vector.len() != info.dimension) {
            return Err(RagError::DimensionMismatch {
                expected: info.dimension,
                actual: bad.vector.len(),
            });
        }

        let records = records
            .into_iter()
            .map(|record| self.bound_record(record))
            .collect::<Result<Vec<_>>>()?;

        let table = self.open_table(name).await?;
        let first_id = table
            .count_rows(None)
            .await
            .map_err(|e| RagError::Database(format!("Failed to count rows: {}", e)))?
            as i64;
        let row_ids: Vec<i64> = (first_id..).take(records.len()).collect();

        let record_batch = Self::create_record_batch(&records, &row_ids, info)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to insert records: {}", e)))?;

        debug!("Inserted {} records into {}", row_ids.len(), name);
        Ok(row_ids)
    }

    /// Nearest neighbours of `query_vector`, ascending by distance
    #[inline]
    pub async fn search(
        &self,
        name: &str,
        query_vector: &[f32],
        top_k: usize,
        metric: DistanceMetric,
    ) -> Result<Vec<SearchHit>> {
        let info = self.describe(name).await?;
        if info.metric != metric {
            return Err(RagError::MetricMismatch {
                collection: info.metric,
                requested: metric,
            });
        }
        if query_vector.len() != info.dimension {
            return Err(RagError::DimensionMismatch {
                expected: info.dimension,
                actual: query_vector.len(),
            });
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        debug!("Searching {} for {} nearest records", name, top_k);
        let table = self.open_table(name).await?;
        let mut results = table
            .vector_search(query_vector)
            .map_err(|e| RagError::Database(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(metric.into())
            .limit(top_k)
            .select(Select::columns(&["row_id"]))
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to execute search: {}", e)))?;

        let mut hits = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| RagError::Database(format!("Failed to read result stream: {}", e)))?
        {
            hits.extend(Self::parse_search_batch(&batch)?);
        }
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));

        debug!("Search returned {} hits", hits.len());
        Ok(hits)
    }

    /// Fetch records by row id in the order of `ids`; unknown ids are skipped
    #[inline]
    pub async fn fetch_by_ids(
        &self,
        name: &str,
        ids: &[i64],
        fields: &[RecordField],
    ) -> Result<Vec<FetchedRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let table = self.open_table(name).await?;
        let columns: Vec<&str> = std::iter::once("row_id")
            .chain(fields.iter().map(|f| f.column_name()))
            .unique()
            .collect();
        let predicate = format!("row_id IN ({})", ids.iter().join(", "));

        let mut results = table
            .query()
            .only_if(predicate)
            .select(Select::columns(columns.as_slice()))
            .limit(ids.len())
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to fetch records: {}", e)))?;

        let mut by_id = HashMap::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| RagError::Database(format!("Failed to read result stream: {}", e)))?
        {
            for record in Self::parse_fetch_batch(&batch, fields)? {
                by_id.insert(record.row_id, record);
            }
        }

        Ok(ids.iter().filter_map(|id| by_id.get(id).cloned()).collect())
    }

    async fn open_table(&self, name: &str) -> Result<lancedb::Table> {
        if !self.has_collection(name).await? {
            return Err(RagError::CollectionNotFound(name.to_string()));
        }
        self.connection
            .open_table(name)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to open collection {}: {}", name, e)))
    }

    async fn describe(&self, name: &str) -> Result<CollectionInfo> {
        let table = self.open_table(name).await?;
        let schema = table
            .schema()
            .await
            .map_err(|e| RagError::Database(format!("Failed to get collection schema: {}", e)))?;

        let dimension = schema
            .fields()
            .iter()
            .find(|field| field.name() == "vector")
            .and_then(|field| match field.data_type() {
                DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
                _ => None,
            })
            .ok_or_else(|| {
                RagError::Database(format!("Collection {} has no vector column", name))
            })?;

        let metric = schema
            .metadata()
            .get(METRIC_METADATA_KEY)
            .and_then(|value| DistanceMetric::parse(value))
            .or_else(|| self.metrics.get(name).copied())
            .unwrap_or(self.default_metric);

        Ok(CollectionInfo { dimension, metric })
    }

    fn bound_record(&self, mut record: VectorRecord) -> Result<VectorRecord> {
        record.source = self.bound_text("source", record.source, SOURCE_MAX_LENGTH)?;
        record.description =
            self.bound_text("description", record.description, DESCRIPTION_MAX_LENGTH)?;
        record.text = self.bound_text("text", record.text, self.max_text_length)?;
        Ok(record)
    }

    fn bound_text(&self, field: &'static str, value: String, max: usize) -> Result<String> {
        let length = value.chars().count();
        if length <= max {
            return Ok(value);
        }

        match self.oversize_policy {
            OversizePolicy::Reject => Err(RagError::TextTooLong { field, length, max }),
            OversizePolicy::Truncate => {
                warn!(
                    "Truncating {} from {} to {} characters",
                    field, length, max
                );
                Ok(value.chars().take(max).collect())
            }
        }
    }

    fn create_record_batch(
        records: &[VectorRecord],
        row_ids: &[i64],
        info: CollectionInfo,
    ) -> Result<RecordBatch> {
        let len = records.len();
        let mut batches = Vec::with_capacity(len);
        let mut sources = Vec::with_capacity(len);
        let mut texts = Vec::with_capacity(len);
        let mut descriptions = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * info.dimension);

        for record in records {
            batches.push(record.batch);
            sources.push(record.source.as_str());
            texts.push(record.text.as_str());
            descriptions.push(record.description.as_str());
            flat_values.extend_from_slice(&record.vector);
        }

        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let vector_array = FixedSizeListArray::try_new(
            field,
            info.dimension as i32,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(|e| RagError::Database(format!("Failed to create vector array: {}", e)))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(Int64Array::from(row_ids.to_vec())),
            Arc::new(Int64Array::from(batches)),
            Arc::new(StringArray::from(sources)),
            Arc::new(StringArray::from(texts)),
            Arc::new(StringArray::from(descriptions)),
            Arc::new(vector_array),
        ];

        RecordBatch::try_new(Self::create_schema(info.dimension, info.metric), arrays)
            .map_err(|e| RagError::Database(format!("Failed to create record batch: {}", e)))
    }

    fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<SearchHit>> {
        let row_ids = column::<Int64Array>(batch, "row_id")?;
        let distances = column::<Float32Array>(batch, "_distance")?;

        Ok((0..batch.num_rows())
            .map(|row| SearchHit {
                row_id: row_ids.value(row),
                distance: distances.value(row),
            })
            .collect())
    }

    fn parse_fetch_batch(batch: &RecordBatch, fields: &[RecordField]) -> Result<Vec<FetchedRecord>> {
        let row_ids = column::<Int64Array>(batch, "row_id")?;
        let batches = optional_column::<Int64Array>(batch, fields, RecordField::Batch)?;
        let sources = optional_column::<StringArray>(batch, fields, RecordField::Source)?;
        let texts = optional_column::<StringArray>(batch, fields, RecordField::Text)?;
        let descriptions = optional_column::<StringArray>(batch, fields, RecordField::Description)?;

        Ok((0..batch.num_rows())
            .map(|row| FetchedRecord {
                row_id: row_ids.value(row),
                batch: batches.map(|c| c.value(row)),
                source: sources.map(|c| c.value(row).to_string()),
                text: texts.map(|c| c.value(row).to_string()),
                description: descriptions.map(|c| c.value(row).to_string()),
            })
            .collect())
    }
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| RagError::Database(format!("Invalid {} column type", name)))
}

fn optional_column<'a, T: 'static>(
    batch: &'a RecordBatch,
    fields: &[RecordField],
    field: RecordField,
) -> Result<Option<&'a T>> {
    if fields.contains(&field) {
        column::<T>(batch, field.column_name()).map(Some)
    } else {
        Ok(None)
    }
}
