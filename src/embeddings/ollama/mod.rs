//! Ollama-backed embedder.
//!
//! Talks to a local Ollama server over its `/api/embed` endpoint with a
//! blocking HTTP agent; the async [`Embedder`] surface dispatches requests on
//! the blocking pool so the orchestrator task is never pinned.


use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::OllamaConfig;
use crate::embeddings::{
    DOCUMENT_PREFIX, Embedder, Embedding, QUERY_PREFIX, estimate_token_count, l2_normalize,
    truncate_for_embedding, validate_vector,
};
use crate::{Result, SearchError};
use async_trait::async_trait;

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    model: String,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let base_url = config
            .endpoint()
            .map_err(|e| SearchError::ModelLoad(format!("invalid Ollama endpoint: {e}")))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            base_url,
            model: config.model.clone(),
            agent,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Verify the server is reachable and the configured model is present.
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        debug!("performing health check for Ollama at {}", self.base_url);

        self.ping()
            .map_err(|e| SearchError::ModelLoad(format!("server ping failed: {e}")))?;
        self.validate_model()
            .map_err(|e| SearchError::ModelLoad(format!("model validation failed: {e}")))?;

        info!(
            "Ollama server at {} serves model {}",
            self.base_url, self.model
        );
        Ok(())
    }

    #[inline]
    pub fn ping(&self) -> anyhow::Result<()> {
        let url = self
            .base_url
            .join("/api/tags")
            .context("failed to build ping URL")?;

        self.make_request_with_retry(|| {
            self.agent
                .get(url.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
        .context("failed to ping Ollama server")?;

        debug!("server ping successful");
        Ok(())
    }

    #[inline]
    pub fn validate_model(&self) -> anyhow::Result<()> {
        let models = self.list_models().context("failed to list models")?;

        if models.iter().any(|m| m.name == self.model) {
            debug!("model {} is available", self.model);
            Ok(())
        } else {
            let available: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
            warn!(
                "model {} not found, available models: {:?}",
                self.model, available
            );
            Err(anyhow!(
                "model '{}' is not available, available models: {:?}",
                self.model,
                available
            ))
        }
    }

    #[inline]
    pub fn list_models(&self) -> anyhow::Result<Vec<ModelInfo>> {
        let url = self
            .base_url
            .join("/api/tags")
            .context("failed to build models URL")?;

        let response_text = self
            .make_request_with_retry(|| {
                self.agent
                    .get(url.as_str())
                    .call()
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("failed to fetch models")?;

        let models_response: ModelsResponse =
            serde_json::from_str(&response_text).context("failed to parse models response")?;

        Ok(models_response.models)
    }

    fn generate_embedding(&self, prompt: &str) -> anyhow::Result<Vec<f32>> {
        let request = EmbedRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
        };

        let url = self
            .base_url
            .join("/api/embed")
            .context("failed to build embedding URL")?;

        let request_json =
            serde_json::to_string(&request).context("failed to serialize embedding request")?;

        let response_text = self
            .make_request_with_retry(|| {
                self.agent
                    .post(url.as_str())
                    .header("Content-Type", "application/json")
                    .send(&request_json)
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("failed to generate embedding")?;

        let embed_response: EmbedResponse =
            serde_json::from_str(&response_text).context("failed to parse embedding response")?;

        Ok(embed_response.embedding)
    }

    async fn embed_with_prefix(&self, prefix: &str, text: &str) -> Result<Embedding> {
        let prompt = format!("{prefix}{}", truncate_for_embedding(text));
        let token_count = estimate_token_count(&prompt);

        let client = self.clone();
        let mut vector = tokio::task::spawn_blocking(move || client.generate_embedding(&prompt))
            .await
            .map_err(|e| SearchError::Embedding(format!("embedding task failed: {e}")))?
            .map_err(|e| SearchError::Embedding(e.to_string()))?;

        validate_vector(&vector)?;
        l2_normalize(&mut vector);

        Ok(Embedding {
            vector,
            token_count,
        })
    }

    fn make_request_with_retry<F>(&self, mut request_fn: F) -> anyhow::Result<String>
    where
        F: FnMut() -> std::result::Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => return Ok(response_text),
                Err(error) => {
                    let should_retry = match &error {
                        ureq::Error::StatusCode(status) => {
                            if *status >= 500 {
                                warn!(
                                    "server error (status {status}), attempt {}/{}",
                                    attempt, self.retry_attempts
                                );
                                true
                            } else {
                                return Err(anyhow!("client error: HTTP {status}"));
                            }
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "transport error: {error}, attempt {}/{}",
                                attempt, self.retry_attempts
                            );
                            true
                        }
                        _ => false,
                    };

                    if !should_retry {
                        return Err(anyhow!("non-retryable error: {error}"));
                    }

                    last_error = Some(anyhow!("request error: {error}"));

                    if attempt < self.retry_attempts {
                        let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                        std::thread::sleep(Duration::from_millis(delay_ms));
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("request failed after retries")))
    }
}

#[async_trait]
impl Embedder for OllamaClient {
    async fn embed_document(&self, text: &str) -> Result<Embedding> {
        self.embed_with_prefix(DOCUMENT_PREFIX, text).await
    }

    async fn embed_query(&self, text: &str) -> Result<Embedding> {
        self.embed_with_prefix(QUERY_PREFIX, text).await
    }
}
