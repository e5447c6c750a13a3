
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ConfigError;
use crate::{QaError, Result};

/// A contiguous window of the corpus text, the unit of retrieval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    /// Position of this chunk in the chunk sequence
    pub index: usize,
    /// Offset of the first character, counted in chars
    pub start: usize,
    /// Offset one past the last character, counted in chars
    pub end: usize,
    /// The chunk text
    pub content: String,
}

/// Configuration for content chunking
///
/// Both sizes are measured in characters (Unicode scalar values), so a chunk
/// boundary never falls inside a multi-byte sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length
    pub chunk_size: usize,
    /// Characters shared between a chunk and its successor
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 500,
        }
    }
}

impl ChunkingConfig {
    /// Distance between the starts of two consecutive chunks
    #[inline]
    pub fn step(&self) -> usize {
        self.chunk_size.saturating_sub(self.chunk_overlap)
    }

    /// Check the sizes; shared by [`chunk_text`] and `Config::validate`
    #[inline]
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize(self.chunk_size));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::OverlapTooLarge(
                self.chunk_overlap,
                self.chunk_size,
            ));
        }
        Ok(())
    }
}

/// Split raw text into overlapping fixed-size windows
///
/// Every character of `text` lands in at least one chunk, consecutive chunks
/// share exactly `chunk_overlap` characters, and only the last chunk may be
/// shorter than `chunk_size`.
#[inline]
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Result<Vec<TextChunk>> {
    config
        .validate()
        .map_err(|e| QaError::Config(e.to_string()))?;

    // Byte offset of every char boundary, including the end of the string
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = boundaries.len() - 1;

    let mut chunks = Vec::new();
    if char_count == 0 {
        return Ok(chunks);
    }

    let step = config.step();
    let mut start = 0;
    loop {
        let end = (start + config.chunk_size).min(char_count);
        let content = text
            .get(boundaries[start]..boundaries[end])
            .ok_or_else(|| QaError::Config("chunk boundary is not a char boundary".to_string()))?;

        chunks.push(TextChunk {
            index: chunks.len(),
            start,
            end,
            content: content.to_string(),
        });

        if end == char_count {
            break;
        }
        start += step;
    }

    debug!(
        "Chunked {} chars into {} chunks (size {}, overlap {})",
        char_count,
        chunks.len(),
        config.chunk_size,
        config.chunk_overlap
    );

    Ok(chunks)
}
