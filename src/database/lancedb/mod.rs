// LanceDB vector database module
// Holds chunk vectors for similarity search and persists them as a LanceDB table

#[cfg(test)]
mod tests;

pub mod vector_store;

pub use vector_store::VectorIndex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::embeddings::TextChunk;
use crate::{QaError, Result};

/// Number of chunks retrieved per question unless configured otherwise
pub const DEFAULT_TOP_K: usize = 4;

/// Name of the LanceDB table holding the chunk rows
pub const TABLE_NAME: &str = "chunks";

/// File written next to the table once it is complete
pub const MANIFEST_FILE: &str = "manifest.json";

/// Description of a persisted index
///
/// Written after the table, so its presence marks a complete index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexManifest {
    /// Embedder that produced the stored vectors
    pub model_id: String,
    /// Width of every stored vector
    pub dimension: usize,
    /// Number of chunk rows in the table
    pub count: usize,
    pub created_at: DateTime<Utc>,
}

impl IndexManifest {
    #[inline]
    pub fn path_in(location: &Path) -> PathBuf {
        location.join(MANIFEST_FILE)
    }

    /// Read the manifest of a persisted index
    ///
    /// A missing manifest means there is no usable index at `location`.
    #[inline]
    pub async fn read(location: &Path) -> Result<Self> {
        let path = Self::path_in(location);
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(QaError::IndexNotFound {
                    path: location.to_path_buf(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&raw).map_err(|e| {
            QaError::Database(format!(
                "Corrupt index manifest {}: {}",
                path.display(),
                e
            ))
        })
    }

    #[inline]
    pub async fn write(&self, location: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| QaError::Database(format!("Failed to encode manifest: {}", e)))?;
        fs::write(Self::path_in(location), json).await?;
        Ok(())
    }

    /// Mark the index at `location` incomplete; a missing manifest is fine
    #[inline]
    pub async fn remove(location: &Path) -> Result<()> {
        match fs::remove_file(Self::path_in(location)).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// One retrieved chunk and its squared L2 distance to the query, as LanceDB reports it
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub chunk: TextChunk,
    pub distance: f32,
}
