#[cfg(test)]
mod tests;

use fastembed::{InitOptions, TextEmbedding};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::EmbeddingConfig;
use crate::{QaError, Result};

/// Maps text to fixed-width vectors
///
/// An index and the queries run against it must go through the same
/// embedder; `VectorIndex` owns one and uses it for both.
pub trait Embedder: Send + Sync {
    /// Identifier recorded next to a persisted index
    fn model_id(&self) -> &str;

    /// Width of every vector this embedder produces
    fn dimension(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in input order
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text
    #[inline]
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| QaError::Embedding("embedder returned no vector".to_string()))
    }
}

impl EmbeddingConfig {
    /// Construct the embedder this configuration describes
    #[inline]
    pub fn build_embedder(&self) -> Result<Arc<dyn Embedder>> {
        self.validate()
            .map_err(|e| QaError::Config(e.to_string()))?;

        Ok(Arc::new(FastEmbedder::new(self)?))
    }
}

/// Local ONNX embedding model served by fastembed
pub struct FastEmbedder {
    model: TextEmbedding,
    model_id: String,
    dimension: usize,
    batch_size: usize,
}

impl FastEmbedder {
    #[inline]
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let supported = TextEmbedding::list_supported_models();
        let info = supported
            .iter()
            .find(|info| info.model_code.eq_ignore_ascii_case(&config.model))
            .ok_or_else(|| {
                let known: Vec<&str> = supported.iter().map(|m| m.model_code.as_str()).collect();
                QaError::Embedding(format!(
                    "Unsupported embedding model '{}'. Supported models: {:?}",
                    config.model, known
                ))
            })?;

        let cache_dir = config.resolved_cache_dir();
        info!(
            "Loading embedding model {} ({} dimensions) from {}",
            info.model_code,
            info.dim,
            cache_dir.display()
        );

        let options = InitOptions::new(info.model.clone())
            .with_cache_dir(cache_dir)
            .with_show_download_progress(false);

        let model = TextEmbedding::try_new(options).map_err(|e| {
            QaError::Embedding(format!(
                "Failed to load embedding model {}: {}",
                info.model_code, e
            ))
        })?;

        Ok(Self {
            model,
            model_id: info.model_code.clone(),
            dimension: info.dim,
            batch_size: config.batch_size,
        })
    }
}

impl Embedder for FastEmbedder {
    #[inline]
    fn model_id(&self) -> &str {
        &self.model_id
    }

    #[inline]
    fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Embedding {} texts with {}", texts.len(), self.model_id);

        let vectors = self
            .model
            .embed(texts.to_vec(), Some(self.batch_size))
            .map_err(|e| QaError::Embedding(format!("fastembed inference failed: {}", e)))?;

        if vectors.len() != texts.len() {
            return Err(QaError::Embedding(format!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                vectors.len()
            )));
        }

        Ok(vectors)
    }
}

/// Feature-hashing embedder for tests and benchmarks
///
/// Not a language model and not selectable from the config file; callers
/// hand it to [`crate::indexer::SharedIndex::with_embedder`]. Each lower-cased alphanumeric token is hashed (FNV-1a) into one of
/// `dimension` signed buckets and the result is L2-normalised, so texts that
/// share vocabulary land close together.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
    model_id: String,
}

impl HashingEmbedder {
    #[inline]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            model_id: format!("hashing-fnv1a-{}", dimension.max(1)),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
        {
            let hash = fnv1a_64(token.to_lowercase().as_bytes());
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        normalize(&mut vector);
        vector
    }
}

impl Embedder for HashingEmbedder {
    #[inline]
    fn model_id(&self) -> &str {
        &self.model_id
    }

    #[inline]
    fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}
