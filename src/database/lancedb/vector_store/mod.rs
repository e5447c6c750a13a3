
use super::{IndexManifest, SearchHit, TABLE_NAME};
use crate::embeddings::{Embedder, TextChunk};
use crate::{QaError, Result};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
    UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::arrow::SendableRecordBatchStream;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Column LanceDB adds to vector search results
const DISTANCE_COLUMN: &str = "_distance";

/// A LanceDB table of embedded chunks plus the embedder that produced them
///
/// Queries go through the same embedder as the chunks did. Search is a flat
/// (exact) L2 scan inside LanceDB; no ANN index is ever created.
pub struct VectorIndex {
    embedder: Arc<dyn Embedder>,
    table: Table,
    location: PathBuf,
    len: usize,
}

impl fmt::Debug for VectorIndex {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VectorIndex")
            .field("model_id", &self.embedder.model_id())
            .field("dimension", &self.embedder.dimension())
            .field("location", &self.location)
            .field("len", &self.len)
            .finish()
    }
}

impl VectorIndex {
    /// Embed every chunk and write the index under `location`
    ///
    /// Any index already at `location` is replaced.
    ///
    /// # Arguments
    /// * `chunks` - Chunks in corpus order
    /// * `embedder` - Embedder used for the chunks now and for queries later
    /// * `batch_size` - Number of chunks sent to the embedder at once
    /// * `location` - Directory holding the LanceDB table and manifest
    #[inline]
    pub async fn build(
        chunks: Vec<TextChunk>,
        embedder: Arc<dyn Embedder>,
        batch_size: usize,
        location: &Path,
    ) -> Result<Self> {
        if chunks.is_empty() {
            return Err(QaError::IndexBuild("no chunks to index".to_string()));
        }

        info!(
            "Embedding {} chunks with {}",
            chunks.len(),
            embedder.model_id()
        );

        let worker = Arc::clone(&embedder);
        let (chunks, vectors) = tokio::task::spawn_blocking(move || {
            let vectors = embed_chunks(&chunks, worker.as_ref(), batch_size)?;
            Ok::<_, QaError>((chunks, vectors))
        })
        .await
        .map_err(|e| QaError::IndexBuild(format!("embedding task failed: {}", e)))??;

        let batch = create_record_batch(&chunks, &vectors, embedder.dimension())?;
        let manifest = write_index(location, embedder.as_ref(), vec![batch], chunks.len()).await?;

        Self::open(location, embedder, &manifest).await
    }

    /// Copy this index to `location`
    ///
    /// Any index already there is replaced. Persisting to the index's own
    /// location leaves it untouched.
    #[inline]
    pub async fn persist(&self, location: &Path) -> Result<IndexManifest> {
        if location == self.location.as_path() {
            return IndexManifest::read(location).await;
        }

        let dimension = self.embedder.dimension();
        let rows = self.read_rows().await?;
        let (chunks, vectors): (Vec<_>, Vec<_>) = rows.into_iter().unzip();
        let batch = create_record_batch(&chunks, &vectors, dimension)?;

        write_index(location, self.embedder.as_ref(), vec![batch], chunks.len()).await
    }

    /// Open an index previously written by [`VectorIndex::build`] or
    /// [`VectorIndex::persist`]
    ///
    /// `embedder` must be the embedder the index was built with.
    #[inline]
    pub async fn load(location: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let manifest = IndexManifest::read(location).await?;

        if manifest.model_id != embedder.model_id() || manifest.dimension != embedder.dimension()
        {
            return Err(QaError::Embedding(format!(
                "index was built with model {} ({} dimensions) but the configured embedder is {} ({} dimensions)",
                manifest.model_id,
                manifest.dimension,
                embedder.model_id(),
                embedder.dimension()
            )));
        }

        let index = Self::open(location, embedder, &manifest).await?;
        info!(
            "Loaded {} chunks from {} (model {})",
            index.len,
            location.display(),
            manifest.model_id
        );
        Ok(index)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn location(&self) -> &Path {
        &self.location
    }

    #[inline]
    pub fn model_id(&self) -> &str {
        self.embedder.model_id()
    }

    /// Every stored chunk, in corpus order
    #[inline]
    pub async fn chunks(&self) -> Result<Vec<TextChunk>> {
        Ok(self
            .read_rows()
            .await?
            .into_iter()
            .map(|(chunk, _)| chunk)
            .collect())
    }

    /// Return the `k` chunks nearest to `query`, nearest first
    ///
    /// Distance is squared L2. Hits at equal distance are ordered by chunk
    /// position. Fewer than `k` rows yields every row; `k == 0` yields nothing.
    #[inline]
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let embedder = Arc::clone(&self.embedder);
        let text = query.to_string();
        let query_vector = tokio::task::spawn_blocking(move || embedder.embed(&text))
            .await
            .map_err(|e| QaError::Embedding(format!("query embedding task failed: {}", e)))??;
        if query_vector.len() != self.embedder.dimension() {
            return Err(QaError::Embedding(format!(
                "query vector has {} dimensions, index has {}",
                query_vector.len(),
                self.embedder.dimension()
            )));
        }

        let results = self
            .table
            .vector_search(query_vector.as_slice())
            .map_err(|e| QaError::Database(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::L2)
            .bypass_vector_index()
            .limit(k)
            .execute()
            .await
            .map_err(|e| QaError::Database(format!("Failed to execute search: {}", e)))?;

        let mut hits = parse_search_results_stream(results).await?;
        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.chunk.index.cmp(&b.chunk.index))
        });
        hits.truncate(k);

        debug!(
            "Search returned {} hits (nearest distance {:?})",
            hits.len(),
            hits.first().map(|hit| hit.distance)
        );
        Ok(hits)
    }

    async fn open(
        location: &Path,
        embedder: Arc<dyn Embedder>,
        manifest: &IndexManifest,
    ) -> Result<Self> {
        let connection = connect(location).await?;
        let table_names = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| QaError::Database(format!("Failed to list tables: {}", e)))?;
        if !table_names.iter().any(|name| name == TABLE_NAME) {
            warn!(
                "Manifest present but table missing at {}",
                location.display()
            );
            return Err(QaError::IndexNotFound {
                path: location.to_path_buf(),
            });
        }

        let table = connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| QaError::Database(format!("Failed to open table: {}", e)))?;

        let rows = table
            .count_rows(None)
            .await
            .map_err(|e| QaError::Database(format!("Failed to count rows: {}", e)))?;
        if rows != manifest.count {
            return Err(QaError::Database(format!(
                "index manifest lists {} chunks but the table holds {}",
                manifest.count, rows
            )));
        }

        Ok(Self {
            embedder,
            table,
            location: location.to_path_buf(),
            len: rows,
        })
    }

    /// Read every row back, ordered by chunk position
    async fn read_rows(&self) -> Result<Vec<(TextChunk, Vec<f32>)>> {
        let mut stream = self
            .table
            .query()
            .limit(self.len)
            .execute()
            .await
            .map_err(|e| QaError::Database(format!("Failed to read table: {}", e)))?;

        let mut rows = Vec::with_capacity(self.len);
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| QaError::Database(format!("Failed to read result stream: {}", e)))?
        {
            rows.extend(parse_rows(&batch, self.embedder.dimension())?);
        }

        rows.sort_by_key(|(chunk, _)| chunk.index);
        Ok(rows)
    }
}

/// Embed chunk contents in batches, checking count and width
fn embed_chunks(
    chunks: &[TextChunk],
    embedder: &dyn Embedder,
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut vectors = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|chunk| chunk.content.clone()).collect();
        let embedded = embedder.embed_batch(&texts)?;
        if embedded.len() != texts.len() {
            return Err(QaError::IndexBuild(format!(
                "embedder returned {} vectors for {} chunks",
                embedded.len(),
                texts.len()
            )));
        }
        vectors.extend(embedded);
        debug!("Embedded {}/{} chunks", vectors.len(), chunks.len());
    }

    let dimension = embedder.dimension();
    if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
        return Err(QaError::IndexBuild(format!(
            "embedder produced a {}-dimensional vector, expected {}",
            bad.len(),
            dimension
        )));
    }

    Ok(vectors)
}

/// Replace whatever index lives at `location` with `batches`
///
/// The manifest is removed first and written last, so an interrupted write
/// leaves a location that reads as "no index".
async fn write_index(
    location: &Path,
    embedder: &dyn Embedder,
    batches: Vec<RecordBatch>,
    count: usize,
) -> Result<IndexManifest> {
    tokio::fs::create_dir_all(location).await.map_err(|e| {
        QaError::Database(format!(
            "Failed to create index directory {}: {}",
            location.display(),
            e
        ))
    })?;
    IndexManifest::remove(location).await?;

    let connection = connect(location).await?;
    drop_table_if_exists(&connection).await?;

    let dimension = embedder.dimension();
    let schema = create_schema(dimension);
    connection
        .create_empty_table(TABLE_NAME, Arc::clone(&schema))
        .execute()
        .await
        .map_err(|e| QaError::Database(format!("Failed to create table: {}", e)))?;

    let table = connection
        .open_table(TABLE_NAME)
        .execute()
        .await
        .map_err(|e| QaError::Database(format!("Failed to open table: {}", e)))?;

    let reader = RecordBatchIterator::new(batches.into_iter().map(Ok::<_, ArrowError>), schema);
    table
        .add(reader)
        .execute()
        .await
        .map_err(|e| QaError::Database(format!("Failed to insert chunks: {}", e)))?;

    let manifest = IndexManifest {
        model_id: embedder.model_id().to_string(),
        dimension,
        count,
        created_at: Utc::now(),
    };
    manifest.write(location).await?;

    info!("Persisted {} chunks to {}", count, location.display());
    Ok(manifest)
}

async fn connect(location: &Path) -> Result<Connection> {
    let uri = location.to_string_lossy();
    debug!("Connecting to LanceDB at {}", uri);
    lancedb::connect(&uri)
        .execute()
        .await
        .map_err(|e| QaError::Database(format!("Failed to connect to LanceDB: {}", e)))
}

/// Drop the chunks table if it exists
async fn drop_table_if_exists(connection: &Connection) -> Result<()> {
    let table_names = connection
        .table_names()
        .execute()
        .await
        .map_err(|e| QaError::Database(format!("Failed to list tables for drop: {}", e)))?;

    if table_names.iter().any(|name| name == TABLE_NAME) {
        info!("Dropping existing chunks table");
        connection
            .drop_table(TABLE_NAME)
            .await
            .map_err(|e| QaError::Database(format!("Failed to drop table: {}", e)))?;
    }

    Ok(())
}

fn create_schema(dimension: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("chunk_index", DataType::UInt32, false),
        Field::new("start_offset", DataType::UInt64, false),
        Field::new("end_offset", DataType::UInt64, false),
        Field::new("content", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                dimension as i32,
            ),
            false,
        ),
    ]))
}

/// Create a RecordBatch holding `chunks` and their vectors
fn create_record_batch(
    chunks: &[TextChunk],
    vectors: &[Vec<f32>],
    dimension: usize,
) -> Result<RecordBatch> {
    let len = chunks.len();

    let mut chunk_indices = Vec::with_capacity(len);
    let mut starts = Vec::with_capacity(len);
    let mut ends = Vec::with_capacity(len);
    let mut contents = Vec::with_capacity(len);
    for chunk in chunks {
        chunk_indices.push(u32::try_from(chunk.index).map_err(|_| {
            QaError::Database(format!("chunk index {} out of range", chunk.index))
        })?);
        starts.push(chunk.start as u64);
        ends.push(chunk.end as u64);
        contents.push(chunk.content.as_str());
    }

    let mut flat_values = Vec::with_capacity(len * dimension);
    for vector in vectors {
        flat_values.extend_from_slice(vector);
    }
    let values_array = Float32Array::from(flat_values);
    let field = Arc::new(Field::new("item", DataType::Float32, false));
    let vector_array =
        FixedSizeListArray::try_new(field, dimension as i32, Arc::new(values_array), None)
            .map_err(|e| QaError::Database(format!("Failed to create vector array: {}", e)))?;

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(UInt32Array::from(chunk_indices)),
        Arc::new(UInt64Array::from(starts)),
        Arc::new(UInt64Array::from(ends)),
        Arc::new(StringArray::from(contents)),
        Arc::new(vector_array),
    ];

    RecordBatch::try_new(create_schema(dimension), arrays)
        .map_err(|e| QaError::Database(format!("Failed to create record batch: {}", e)))
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .ok_or_else(|| QaError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| QaError::Database(format!("Invalid {} column type", name)))
}

/// Rebuild the chunks of one record batch
fn parse_chunks(batch: &RecordBatch) -> Result<Vec<TextChunk>> {
    let chunk_indices = column::<UInt32Array>(batch, "chunk_index")?;
    let starts = column::<UInt64Array>(batch, "start_offset")?;
    let ends = column::<UInt64Array>(batch, "end_offset")?;
    let contents = column::<StringArray>(batch, "content")?;

    Ok((0..batch.num_rows())
        .map(|row| TextChunk {
            index: chunk_indices.value(row) as usize,
            start: starts.value(row) as usize,
            end: ends.value(row) as usize,
            content: contents.value(row).to_string(),
        })
        .collect())
}

/// Parse one record batch back into chunks and vectors
fn parse_rows(batch: &RecordBatch, dimension: usize) -> Result<Vec<(TextChunk, Vec<f32>)>> {
    let vectors = column::<FixedSizeListArray>(batch, "vector")?;

    parse_chunks(batch)?
        .into_iter()
        .enumerate()
        .map(|(row, chunk)| {
            let values = vectors.value(row);
            let values = values
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| QaError::Database("Invalid vector item type".to_string()))?;
            let vector = values.values().to_vec();
            if vector.len() != dimension {
                return Err(QaError::Database(format!(
                    "stored vector has {} dimensions, manifest says {}",
                    vector.len(),
                    dimension
                )));
            }
            Ok((chunk, vector))
        })
        .collect()
}

/// Parse search results from LanceDB stream into SearchHit structs
async fn parse_search_results_stream(
    mut results: SendableRecordBatchStream,
) -> Result<Vec<SearchHit>> {
    let mut hits = Vec::new();

    while let Some(batch) = results
        .try_next()
        .await
        .map_err(|e| QaError::Database(format!("Failed to read result stream: {}", e)))?
    {
        let distances = column::<Float32Array>(&batch, DISTANCE_COLUMN)?;
        for (row, chunk) in parse_chunks(&batch)?.into_iter().enumerate() {
            hits.push(SearchHit {
                chunk,
                distance: distances.value(row),
            });
        }
    }

    Ok(hits)
}
