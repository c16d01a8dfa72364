//! Cross-encoder reranker client.
//!
//! Speaks the `/rerank` protocol served by text-embeddings-inference style
//! scoring servers: the request carries a query and a list of passages, the
//! response one relevance probability per passage.


use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::RerankerConfig;
use crate::embeddings::Reranker;
use crate::{Result, SearchError};
use async_trait::async_trait;

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

#[derive(Debug, Clone)]
pub struct HttpReranker {
    base_url: Url,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct RerankRequest {
    query: String,
    texts: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RerankEntry {
    index: usize,
    score: f32,
}

impl HttpReranker {
    #[inline]
    pub fn new(config: &RerankerConfig) -> Result<Self> {
        let base_url = config
            .endpoint()
            .map_err(|e| SearchError::ModelLoad(format!("invalid reranker endpoint: {e}")))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            base_url,
            agent,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Check that the scoring endpoint answers.
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        self.score_passages("ping", &["pong".to_string()])
            .map_err(|e| SearchError::ModelLoad(format!("reranker health check failed: {e}")))?;
        debug!("reranker at {} is healthy", self.base_url);
        Ok(())
    }

    fn score_passages(&self, query: &str, passages: &[String]) -> anyhow::Result<Vec<f32>> {
        let request = RerankRequest {
            query: query.to_string(),
            texts: passages.to_vec(),
        };

        let url = self
            .base_url
            .join("/rerank")
            .context("failed to build rerank URL")?;

        let request_json =
            serde_json::to_string(&request).context("failed to serialize rerank request")?;

        let response_text = self
            .make_request_with_retry(|| {
                self.agent
                    .post(url.as_str())
                    .header("Content-Type", "application/json")
                    .send(&request_json)
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("rerank request failed")?;

        let mut entries: Vec<RerankEntry> =
            serde_json::from_str(&response_text).context("failed to parse rerank response")?;

        if entries.len() != passages.len() {
            return Err(anyhow!(
                "rerank response has {} entries for {} passages",
                entries.len(),
                passages.len()
            ));
        }

        entries.sort_by_key(|entry| entry.index);
        Ok(entries.into_iter().map(|entry| entry.score).collect())
    }

    fn make_request_with_retry<F>(&self, mut request_fn: F) -> anyhow::Result<String>
    where
        F: FnMut() -> std::result::Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            match request_fn() {
                Ok(response_text) => return Ok(response_text),
                Err(error) => {
                    let should_retry = match &error {
                        ureq::Error::StatusCode(status) => {
                            if *status >= 500 {
                                warn!(
                                    "reranker server error (status {status}), attempt {}/{}",
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
                                "reranker transport error: {error}, attempt {}/{}",
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
impl Reranker for HttpReranker {
    async fn score(&self, query: &str, passage: &str) -> Result<f32> {
        let client = self.clone();
        let query = query.to_string();
        let passages = vec![passage.to_string()];

        let scores =
            tokio::task::spawn_blocking(move || client.score_passages(&query, &passages))
                .await
                .map_err(|e| SearchError::Embedding(format!("rerank task failed: {e}")))?
                .map_err(|e| SearchError::Embedding(e.to_string()))?;

        scores
            .first()
            .copied()
            .map(|score| score.clamp(0.0, 1.0))
            .ok_or_else(|| SearchError::Embedding("rerank response was empty".to_string()))
    }
}
