//! LLM client configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the LLM requester service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Full URL of the requester endpoint.
    #[serde(default = "default_url")]
    pub url: String,
    /// Model label passed through to the requester
    #[serde(default = "default_model")]
    pub model: String,
    /// Request mode understood by the requester
    #[serde(default = "default_mode")]
    pub mode: String,
    /// Per-attempt timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Waits before each retry; one attempt plus one per entry
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: Vec<u64>,
}

fn default_url() -> String {
    "http://localhost:8000/api/v1/process".to_string()
}

fn default_model() -> String {
    "yandexgpt".to_string()
}

fn default_mode() -> String {
    "sync".to_string()
}

fn default_timeout_secs() -> u64 {
    1800
}

fn default_retry_backoff_secs() -> Vec<u64> {
    vec![5, 30, 60]
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self::base_default().with_env_overrides()
    }
}

impl LlmConfig {
    /// Base default without env overrides.
    pub(crate) fn base_default() -> Self {
        Self {
            url: default_url(),
            model: default_model(),
            mode: default_mode(),
            timeout_secs: default_timeout_secs(),
            retry_backoff_secs: default_retry_backoff_secs(),
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `LLM_URL`: requester endpoint
    /// - `LLM_MODEL`: model label
    /// - `LLM_MODE`: request mode
    /// - `LLM_TIMEOUT_SECS`: per-attempt timeout
    /// - `LLM_RETRY_BACKOFF_SECS`: comma-separated waits, e.g. `5,30,60`
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("LLM_URL") {
            self.url = val;
        }
        if let Ok(val) = std::env::var("LLM_MODEL") {
            self.model = val;
        }
        if let Ok(val) = std::env::var("LLM_MODE") {
            self.mode = val;
        }
        if let Ok(val) = std::env::var("LLM_TIMEOUT_SECS") {
            if let Ok(n) = val.parse() {
                self.timeout_secs = n;
            }
        }
        if let Ok(val) = std::env::var("LLM_RETRY_BACKOFF_SECS") {
            let parsed: Result<Vec<u64>, _> = val
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::parse)
                .collect();
            if let Ok(backoff) = parsed {
                self.retry_backoff_secs = backoff;
            }
        }
        self
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    pub fn with_retry_backoff(mut self, secs: Vec<u64>) -> Self {
        self.retry_backoff_secs = secs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_defaults() {
        let config = LlmConfig::base_default();
        assert_eq!(config.mode, "sync");
        assert_eq!(config.retry_backoff_secs, vec![5, 30, 60]);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: LlmConfig = toml::from_str(r#"url = "http://llm:9000/run""#).unwrap();
        assert_eq!(config.url, "http://llm:9000/run");
        assert_eq!(config.timeout_secs, 1800);
    }
}
