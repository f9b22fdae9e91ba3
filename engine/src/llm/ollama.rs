//! Ollama adapters
//!
//! Ollama runs models locally, typically at http://localhost:11434. Two
//! endpoints are used:
//! - `/api/chat` for the LLM judge
//! - `/api/embeddings` for the embedding tier

use async_trait::async_trait;
use reqwest::Client;
use sdk::capability::{Embedder, Judge};
use sdk::errors::EngineError;
use sdk::types::{JudgeVerdict, ReviewRequest};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::{build_review_prompt, parse_verdict, LLMError, Message, Result, REVIEWER_SYSTEM_PROMPT};
use crate::config::OllamaConfig;
use crate::validation::canonical_json;

/// HTTP client for one Ollama model
#[derive(Debug, Clone)]
pub struct OllamaClient {
    /// Base URL for Ollama API (typically http://localhost:11434)
    base_url: String,

    /// Model name to use (e.g., "llama3.1:8b")
    model: String,

    client: Client,
}

impl OllamaClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LLMError::InvalidRequest(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client,
        })
    }

    pub fn from_config(config: &OllamaConfig) -> Result<Self> {
        Self::new(
            &config.base_url,
            &config.model,
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a non-streaming chat request and return the reply text
    pub async fn chat(&self, messages: &[Message]) -> Result<String> {
        tracing::debug!(
            "Ollama chat request: model={}, messages={}, total_chars={}",
            self.model,
            messages.len(),
            messages.iter().map(|m| m.content.len()).sum::<usize>()
        );

        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
        };

        let start = std::time::Instant::now();
        let response: ChatResponse = self.post_json("api/chat", &request).await?;

        tracing::debug!(
            "Ollama chat response received in {:.1}s",
            start.elapsed().as_secs_f64()
        );

        Ok(response.message.content)
    }

    /// Embed a text prompt
    pub async fn embed(&self, prompt: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.model,
            prompt,
        };
        let response: EmbeddingResponse = self.post_json("api/embeddings", &request).await?;

        if response.embedding.is_empty() {
            return Err(LLMError::ParseError(
                "Ollama returned an empty embedding".to_string(),
            ));
        }
        Ok(response.embedding)
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LLMError::Timeout
                } else if e.is_connect() {
                    LLMError::ProviderUnavailable(format!(
                        "Cannot connect to Ollama at {}. Is Ollama running?",
                        self.base_url
                    ))
                } else {
                    LLMError::NetworkError(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(LLMError::ProviderUnavailable(format!(
                "Ollama API error ({}): {}",
                status, error_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(format!("Failed to parse Ollama response: {}", e)))
    }
}

fn judge_error(err: LLMError) -> EngineError {
    match err {
        LLMError::Timeout => EngineError::Judge("Ollama request timed out".to_string()),
        other => EngineError::Judge(other.to_string()),
    }
}

/// LLM judge backed by an Ollama chat model
pub struct OllamaJudge {
    client: OllamaClient,
}

impl OllamaJudge {
    pub fn new(client: OllamaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Judge for OllamaJudge {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn judge(&self, request: &ReviewRequest) -> std::result::Result<JudgeVerdict, EngineError> {
        let messages = [
            Message::system(REVIEWER_SYSTEM_PROMPT),
            Message::user(build_review_prompt(request)),
        ];
        let reply = self.client.chat(&messages).await.map_err(judge_error)?;
        parse_verdict(&reply).map_err(judge_error)
    }
}

/// Embedder backed by an Ollama embedding model
///
/// Payloads are embedded through their canonical JSON text.
pub struct OllamaEmbedder {
    client: OllamaClient,
}

impl OllamaEmbedder {
    pub fn new(client: OllamaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn embed(&self, data: &Value) -> std::result::Result<Vec<f32>, EngineError> {
        self.client
            .embed(&canonical_json(data))
            .await
            .map_err(|e| EngineError::Embedding(e.to_string()))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Message,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}
