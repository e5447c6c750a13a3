// Indexer module
// Owns the one vector index a process serves from: load it from disk, or build and persist it


use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::{Config, EmbeddingConfig};
use crate::database::VectorIndex;
use crate::documents::{DocumentSource, PdfDirectory};
use crate::embeddings::{ChunkingConfig, Embedder, chunk_text};
use crate::{QaError, Result};

/// Lifecycle of the shared index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexStatus {
    /// Nothing has asked for the index yet
    Pending,
    /// Loading from disk or building from the corpus
    Building,
    Ready { chunks: usize },
    /// The last attempt failed; the next request retries
    Unavailable { reason: String },
}

impl IndexStatus {
    #[inline]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Building => "building",
            Self::Ready { .. } => "ready",
            Self::Unavailable { .. } => "unavailable",
        }
    }
}

/// Lazily initialised, process-wide vector index
///
/// Concurrent first callers of [`SharedIndex::get`] wait on a single
/// initialisation, so the corpus is embedded at most once per process.
pub struct SharedIndex {
    location: PathBuf,
    chunking: ChunkingConfig,
    embedding: EmbeddingConfig,
    source: Arc<dyn DocumentSource>,
    embedder: OnceCell<Arc<dyn Embedder>>,
    index: OnceCell<Arc<VectorIndex>>,
    status: RwLock<IndexStatus>,
    builds: AtomicUsize,
}

impl SharedIndex {
    /// Index over the configured PDF directory
    #[inline]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config,
            Arc::new(PdfDirectory::new(&config.corpus.dataset_dir)),
        )
    }

    /// Index over an arbitrary document source
    #[inline]
    pub fn new(config: &Config, source: Arc<dyn DocumentSource>) -> Self {
        Self::with_embedder_cell(config, source, OnceCell::new())
    }

    /// Index using `embedder` instead of the configured fastembed model
    #[inline]
    pub fn with_embedder(
        config: &Config,
        source: Arc<dyn DocumentSource>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self::with_embedder_cell(config, source, OnceCell::new_with(Some(embedder)))
    }

    fn with_embedder_cell(
        config: &Config,
        source: Arc<dyn DocumentSource>,
        embedder: OnceCell<Arc<dyn Embedder>>,
    ) -> Self {
        Self {
            location: config.index.path.clone(),
            chunking: config.chunking,
            embedding: config.embedding.clone(),
            source,
            embedder,
            index: OnceCell::new(),
            status: RwLock::new(IndexStatus::Pending),
            builds: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn location(&self) -> &Path {
        &self.location
    }

    #[inline]
    pub fn status(&self) -> IndexStatus {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of times this handle embedded the corpus
    #[inline]
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    /// The index, loading or building it on first use
    ///
    /// A failed initialisation is recorded in [`SharedIndex::status`] and
    /// retried by the next call. If the caller driving initialisation is
    /// dropped midway, the status returns to `Pending` and the next call
    /// starts over.
    #[inline]
    pub async fn get(&self) -> Result<Arc<VectorIndex>> {
        self.index
            .get_or_try_init(|| self.initialise(false))
            .await
            .map(Arc::clone)
    }

    /// Discard any loaded or persisted index and build a fresh one
    #[inline]
    pub async fn rebuild(&mut self) -> Result<Arc<VectorIndex>> {
        self.index.take();
        self.index
            .get_or_try_init(|| self.initialise(true))
            .await
            .map(Arc::clone)
    }

    /// Start initialisation on a background task
    #[inline]
    pub fn spawn_warmup(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Ok(index) = this.get().await {
                info!("Index warm-up finished with {} chunks", index.len());
            }
        })
    }

    async fn initialise(&self, force_build: bool) -> Result<Arc<VectorIndex>> {
        self.set_status(IndexStatus::Building);
        let mut guard = BuildingGuard {
            status: &self.status,
            finished: false,
        };

        let result = self.load_or_build(force_build).await;
        guard.finished = true;
        match &result {
            Ok(index) => self.set_status(IndexStatus::Ready {
                chunks: index.len(),
            }),
            Err(e) => {
                error!("Index initialisation failed: {}", e);
                self.set_status(IndexStatus::Unavailable {
                    reason: e.to_string(),
                });
            }
        }
        result
    }

    async fn load_or_build(&self, force_build: bool) -> Result<Arc<VectorIndex>> {
        let embedder = self.embedder().await?;

        if !force_build {
            match VectorIndex::load(&self.location, Arc::clone(&embedder)).await {
                Ok(index) => return Ok(Arc::new(index)),
                Err(QaError::IndexNotFound { path }) => {
                    info!(
                        "No index at {}, building from {}",
                        path.display(),
                        self.source.describe()
                    );
                }
                Err(e) => return Err(e),
            }
        }

        self.build(embedder).await
    }

    async fn build(&self, embedder: Arc<dyn Embedder>) -> Result<Arc<VectorIndex>> {
        self.builds.fetch_add(1, Ordering::SeqCst);

        let source = Arc::clone(&self.source);
        let chunking = self.chunking;
        let chunks = tokio::task::spawn_blocking(move || {
            let text = source.load_text()?;
            chunk_text(&text, &chunking)
        })
        .await
        .map_err(|e| QaError::IndexBuild(format!("document loading task failed: {}", e)))??;
        info!("Split corpus into {} chunks", chunks.len());

        let index =
            VectorIndex::build(chunks, embedder, self.embedding.batch_size, &self.location)
                .await?;
        Ok(Arc::new(index))
    }

    async fn embedder(&self) -> Result<Arc<dyn Embedder>> {
        self.embedder
            .get_or_try_init(|| async {
                let config = self.embedding.clone();
                tokio::task::spawn_blocking(move || config.build_embedder())
                    .await
                    .map_err(|e| {
                        QaError::Embedding(format!("embedder setup task failed: {}", e))
                    })?
            })
            .await
            .map(Arc::clone)
    }

    fn set_status(&self, status: IndexStatus) {
        set_status(&self.status, status);
    }
}

fn set_status(cell: &RwLock<IndexStatus>, status: IndexStatus) {
    *cell.write().unwrap_or_else(PoisonError::into_inner) = status;
}

/// Puts the status back to `Pending` when an initialisation future is
/// dropped before finishing
struct BuildingGuard<'a> {
    status: &'a RwLock<IndexStatus>,
    finished: bool,
}

impl Drop for BuildingGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!("Index initialisation was cancelled before it finished");
            set_status(self.status, IndexStatus::Pending);
        }
    }
}
