//! HTTP client for the LLM requester service.
//!
//! One request carries the prompt messages and the JSON schema the answer must
//! follow. Transport errors and non-2xx statuses are retried on the configured
//! backoff schedule.

mod config;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

pub use config::LlmConfig;

use super::report::{LlmResponse, Message};
use super::LlmBackend;

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Failed to reach the LLM service
    #[error("connection error: {0}")]
    Connection(String),
    /// The service answered with an error status
    #[error("API error: {0}")]
    Api(String),
    /// The response body was not understood
    #[error("parse error: {0}")]
    Parse(String),
    /// A prompt was sent without an answer schema
    #[error("schema is missing")]
    MissingSchema,
}

#[derive(Debug, Serialize)]
struct RequestBody<'a> {
    mode: &'a str,
    model: &'a str,
    messages: &'a [Message],
    schema: &'a serde_json::Value,
}

/// LLM requester client.
pub struct LlmClient {
    config: LlmConfig,
    client: Client,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Connection(e.to_string()))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Send one prompt, retrying on failure.
    pub async fn send_message(
        &self,
        messages: &[Message],
        schema: &serde_json::Value,
    ) -> Result<LlmResponse, LlmError> {
        if schema.is_null() {
            return Err(LlmError::MissingSchema);
        }
        let body = RequestBody {
            mode: &self.config.mode,
            model: &self.config.model,
            messages,
            schema,
        };

        let waits = std::iter::once(0).chain(self.config.retry_backoff_secs.iter().copied());
        let attempts = self.config.retry_backoff_secs.len() + 1;
        let mut last_error = None;

        for (attempt, wait) in waits.enumerate() {
            if let Some(ref e) = last_error {
                warn!(
                    attempt = attempt + 1,
                    attempts,
                    wait_secs = wait,
                    error = %e,
                    "retrying LLM request"
                );
                tokio::time::sleep(Duration::from_secs(wait)).await;
            }
            match self.attempt(&body).await {
                Ok(resp) => return Ok(resp),
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error.unwrap_or_else(|| LlmError::Api("no attempt was made".to_string())))
    }

    async fn attempt(&self, body: &RequestBody<'_>) -> Result<LlmResponse, LlmError> {
        let started = std::time::Instant::now();
        let resp = self
            .client
            .post(&self.config.url)
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            debug!(%status, body = %text, "LLM service returned an error");
            return Err(LlmError::Api(format!("HTTP {}", status)));
        }

        let parsed: LlmResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;
        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            tokens = ?parsed.tokens(),
            "LLM response received"
        );
        Ok(parsed)
    }
}

#[async_trait]
impl LlmBackend for LlmClient {
    async fn send(
        &self,
        messages: &[Message],
        schema: &serde_json::Value,
        _use_cache: bool,
    ) -> Result<LlmResponse, LlmError> {
        self.send_message(messages, schema).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_schema_is_rejected_without_request() {
        let client = LlmClient::new(
            LlmConfig::base_default()
                .with_url("http://127.0.0.1:9/unreachable")
                .with_retry_backoff(vec![]),
        )
        .unwrap();
        let err = client
            .send_message(&[Message::new("user", "x")], &serde_json::Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::MissingSchema));
    }

    #[tokio::test]
    async fn test_connection_error_after_attempts() {
        let client = LlmClient::new(
            LlmConfig::base_default()
                .with_url("http://127.0.0.1:9/unreachable")
                .with_retry_backoff(vec![0]),
        )
        .unwrap();
        let err = client
            .send_message(&[Message::new("user", "x")], &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Connection(_)));
    }
}
