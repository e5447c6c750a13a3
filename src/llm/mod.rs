// LLM module
// Prompt assembly and the OpenAI-compatible chat-completions client that writes the answers


use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::LlmConfig;
use crate::database::SearchHit;
use crate::{QaError, Result};

/// FAQ prompt used by the endpoint and the chat front end
pub const DEFAULT_TEMPLATE: &str = "You are {assistant}.
Do not provide any other answer unrelated to {topic}.
You will respond to the user's queries by leveraging the Context Provided.
Context: {context}
Question: {question}
Answer:";

/// Prompt text with `{assistant}`, `{topic}`, `{context}` and `{question}` slots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    #[inline]
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE)
    }
}

impl PromptTemplate {
    #[inline]
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Fill every slot in one pass
    ///
    /// Substituted values are never re-scanned, so braces inside a question or
    /// a retrieved chunk come through verbatim.
    #[inline]
    pub fn render(&self, assistant: &str, topic: &str, context: &str, question: &str) -> String {
        let mut rendered = String::with_capacity(self.template.len() + context.len());
        let mut rest = self.template.as_str();

        while let Some((before, after_open)) = rest.split_once('{') {
            rendered.push_str(before);
            let substituted = after_open.split_once('}').and_then(|(name, after_close)| {
                let value = match name {
                    "assistant" => assistant,
                    "topic" => topic,
                    "context" => context,
                    "question" => question,
                    _ => return None,
                };
                Some((value, after_close))
            });

            match substituted {
                Some((value, after_close)) => {
                    rendered.push_str(value);
                    rest = after_close;
                }
                None => {
                    rendered.push('{');
                    rest = after_open;
                }
            }
        }
        rendered.push_str(rest);
        rendered
    }
}

/// Retrieved chunk contents, nearest first, separated by blank lines
#[inline]
pub fn build_context(hits: &[SearchHit]) -> String {
    hits.iter().map(|hit| hit.chunk.content.as_str()).join("\n\n")
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Blocking client for an OpenAI-compatible `/chat/completions` endpoint
///
/// Each completion is a single attempt; failures are reported, not retried.
#[derive(Debug, Clone)]
pub struct ChatClient {
    endpoint: Url,
    model: String,
    temperature: f32,
    api_key: Option<String>,
    agent: ureq::Agent,
}

impl ChatClient {
    /// Build a client, reading the API key once from config or environment
    #[inline]
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let endpoint = config
            .endpoint_url()
            .map_err(|e| QaError::Config(e.to_string()))?;

        let api_key = config.resolve_api_key();
        if api_key.is_none() {
            warn!(
                "No API key found in ${}; answer generation will fail until one is configured",
                config.api_key_env
            );
        }

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .http_status_as_error(false)
            .build()
            .into();

        Ok(Self {
            endpoint,
            model: config.model.clone(),
            temperature: config.temperature,
            api_key,
            agent,
        })
    }

    #[inline]
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    #[inline]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Send `prompt` as a single user message and return the reply text
    #[inline]
    pub fn complete(&self, prompt: &str) -> Result<String> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(QaError::Upstream(
                "authentication failed: no API key configured".to_string(),
            ));
        };

        let request = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };
        let request_json = serde_json::to_string(&request)
            .map_err(|e| QaError::Upstream(format!("failed to encode request: {}", e)))?;

        debug!(
            "POST {} (model {}, prompt {} chars)",
            self.endpoint,
            self.model,
            prompt.len()
        );

        let mut response = self
            .agent
            .post(self.endpoint.as_str())
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .send(&request_json)
            .map_err(|e| QaError::Upstream(format!("request to {} failed: {}", self.endpoint, e)))?;

        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| QaError::Upstream(format!("failed to read response body: {}", e)))?;

        if status >= 400 {
            warn!("Chat completion failed with HTTP {}", status);
            return Err(status_error(status, &body));
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| QaError::Upstream(format!("malformed response: {}", e)))?;

        let answer = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| QaError::Upstream("response contained no choices".to_string()))?;

        debug!("Received {} chars from {}", answer.len(), self.model);
        Ok(answer)
    }
}

fn classify_status(status: u16) -> &'static str {
    match status {
        401 | 403 => "authentication failed",
        429 => "rate limited",
        500..=599 => "server error",
        _ => "request rejected",
    }
}

fn status_error(status: u16, body: &str) -> QaError {
    let kind = classify_status(status);
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(parsed) => QaError::Upstream(format!(
            "{} (HTTP {}): {}",
            kind, status, parsed.error.message
        )),
        Err(_) => QaError::Upstream(format!("{} (HTTP {})", kind, status)),
    }
}

/// Turns a question plus retrieved chunks into an answer
#[derive(Debug, Clone)]
pub struct AnswerGenerator {
    client: Arc<ChatClient>,
    template: PromptTemplate,
    assistant: String,
    topic: String,
}

impl AnswerGenerator {
    #[inline]
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let client = ChatClient::new(config)?;
        info!(
            "Answer generator using {} at {}",
            config.model,
            client.endpoint()
        );
        Ok(Self {
            client: Arc::new(client),
            template: PromptTemplate::default(),
            assistant: config.assistant_name.clone(),
            topic: config.topic.clone(),
        })
    }

    #[inline]
    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    #[inline]
    pub fn client(&self) -> &ChatClient {
        &self.client
    }

    /// The exact prompt sent for `question`
    #[inline]
    pub fn prompt(&self, question: &str, hits: &[SearchHit]) -> String {
        self.template
            .render(&self.assistant, &self.topic, &build_context(hits), question)
    }

    #[inline]
    pub fn generate_blocking(&self, question: &str, hits: &[SearchHit]) -> Result<String> {
        self.client.complete(&self.prompt(question, hits))
    }

    /// Generate an answer without blocking the async runtime
    #[inline]
    pub async fn generate(&self, question: &str, hits: &[SearchHit]) -> Result<String> {
        let prompt = self.prompt(question, hits);
        let client = Arc::clone(&self.client);
        tokio::task::spawn_blocking(move || client.complete(&prompt))
            .await
            .map_err(|e| QaError::Upstream(format!("completion task failed: {}", e)))?
    }
}
