// Embeddings module
// Text chunking and the embedding backends shared by index build and query

pub mod chunking;
pub mod embedder;

pub use chunking::{ChunkingConfig, TextChunk, chunk_text};
pub use embedder::{Embedder, FastEmbedder, HashingEmbedder};
