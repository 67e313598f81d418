//! Text-generation service client.
//!
//! The [`Generator`] trait is the orchestrator's only view of the answer
//! model; the HTTP implementation calls an Ollama-style `/api/generate`
//! endpoint with a bounded timeout. Generation is never retried — a slow or
//! failed call degrades to an explicit "could not generate" answer at the
//! orchestrator layer, carrying the citations that would have been used.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::GenerationConfig;

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

pub struct HttpGenerator {
    client: reqwest::Client,
    url: String,
    model: String,
    num_predict: u32,
    temperature: f64,
}

impl HttpGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            num_predict: config.num_predict,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": self.temperature,
                "top_p": 0.9,
                "num_predict": self.num_predict,
            },
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.url))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    anyhow!("generation timed out")
                } else {
                    anyhow!("generation connection error (is the service running at {}?): {}", self.url, e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("generation service error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        let answer = json
            .get("response")
            .and_then(|r| r.as_str())
            .unwrap_or("")
            .trim()
            .to_string();

        if answer.is_empty() {
            bail!("generation service returned an empty response");
        }

        Ok(answer)
    }
}
