use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, QaError>;

#[derive(Error, Debug)]
pub enum QaError {
    #[error("No PDF files found in the dataset directory: {}", dir.display())]
    NoDocumentsFound { dir: PathBuf },

    #[error("No persisted index found at {}", path.display())]
    IndexNotFound { path: PathBuf },

    #[error("Index build failed: {0}")]
    IndexBuild(String),

    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Upstream LLM error: {0}")]
    Upstream(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Document error: {0}")]
    Document(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid question: {0}")]
    InvalidQuestion(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod chat;
pub mod commands;
pub mod config;
pub mod database;
pub mod documents;
pub mod embeddings;
pub mod indexer;
pub mod llm;
pub mod pipeline;
pub mod server;
