// Question-answering pipeline
// Retrieve the nearest chunks, then ask the LLM; shared by the HTTP endpoint, the chat and the CLI


use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::config::Config;
use crate::database::SearchHit;
use crate::indexer::SharedIndex;
use crate::llm::AnswerGenerator;
use crate::{QaError, Result};

/// A generated answer and the chunks it was grounded on
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    /// Retrieved chunks, nearest first
    pub sources: Vec<SearchHit>,
}

pub struct QaService {
    index: Arc<SharedIndex>,
    generator: AnswerGenerator,
    top_k: usize,
}

impl QaService {
    #[inline]
    pub fn new(index: Arc<SharedIndex>, generator: AnswerGenerator, top_k: usize) -> Self {
        Self {
            index,
            generator,
            top_k,
        }
    }

    /// Service over the configured corpus, index location and LLM
    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            Arc::new(SharedIndex::from_config(config)),
            AnswerGenerator::from_config(&config.llm)?,
            config.index.top_k,
        ))
    }

    #[inline]
    pub fn index(&self) -> &Arc<SharedIndex> {
        &self.index
    }

    /// Answer one question from the corpus
    ///
    /// The first call may load or build the index.
    #[inline]
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(QaError::InvalidQuestion(
                "question must not be empty".to_string(),
            ));
        }

        let index = self.index.get().await?;

        let started = Instant::now();
        let sources = index.search(question, self.top_k).await?;
        debug!(
            "Retrieved {} chunks in {:?}",
            sources.len(),
            started.elapsed()
        );

        let text = self.generator.generate(question, &sources).await?;
        Ok(Answer { text, sources })
    }
}
