//! Embedding service client.
//!
//! Defines the [`Embedder`] trait and the HTTP implementation that calls an
//! Ollama-style `/api/embeddings` endpoint. Dimensionality is fixed per
//! deployment and validated against every response.
//!
//! # Retry Strategy
//!
//! Transient failures (HTTP 429, 5xx, network errors) are retried with
//! exponential backoff — 1s, 2s, 4s, ... — up to the configured attempt
//! cap. Other client errors fail immediately.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

use crate::config::EmbeddingConfig;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed one text into a fixed-dimension vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    /// The embedding vector dimensionality.
    fn dims(&self) -> usize;
    /// Model identifier recorded against embedded chunks.
    fn model_name(&self) -> &str;
}

/// Embedding provider backed by an HTTP service.
pub struct HttpEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dims: config.dims,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": text,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(format!("{}/api/embeddings", self.url))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        let vector = parse_embedding_response(&json)?;
                        if vector.len() != self.dims {
                            bail!(
                                "embedding dimension mismatch: service returned {}, index expects {}",
                                vector.len(),
                                self.dims
                            );
                        }
                        return Ok(vector);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        warn!(%status, attempt, "embedding service error, retrying");
                        last_err = Some(anyhow!("embedding service error {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("embedding service error {}: {}", status, body_text);
                }
                Err(e) => {
                    warn!(error = %e, attempt, "embedding request failed, retrying");
                    last_err = Some(anyhow!(
                        "embedding connection error (is the service running at {}?): {}",
                        self.url,
                        e
                    ));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("embedding failed after retries")))
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn parse_embedding_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let embedding = json
        .get("embedding")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("invalid embedding response: missing embedding array"))?;

    Ok(embedding
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}
