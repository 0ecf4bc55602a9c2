//! Content-addressed cache of LLM responses.
//!
//! The key is the SHA-256 of the JSON-serialised message list, so two prompts
//! with the same roles and contents in the same order share an entry. Entries
//! never expire; purging is an administrative action. Answers served from the
//! cache carry no usage or cost.

use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use super::client::LlmError;
use super::report::{LlmResponse, Message};
use super::LlmBackend;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache storage error: {0}")]
    Storage(String),
}

/// Storage for raw response payloads keyed by message hash.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn get(&self, messages_hash: &str) -> Result<Option<String>, CacheError>;
    async fn put(&self, messages_hash: &str, response_data: &str) -> Result<(), CacheError>;
}

/// Hex SHA-256 of the serialised messages.
pub fn messages_hash(messages: &[Message]) -> String {
    let json = serde_json::to_vec(messages).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&json);
    hex::encode(hasher.finalize())
}

/// Backend decorator that writes every response to the cache and reads from it
/// when the caller asks for cached answers.
pub struct CachedLlm {
    inner: Arc<dyn LlmBackend>,
    cache: Arc<dyn ResponseCache>,
}

impl CachedLlm {
    pub fn new(inner: Arc<dyn LlmBackend>, cache: Arc<dyn ResponseCache>) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl LlmBackend for CachedLlm {
    async fn send(
        &self,
        messages: &[Message],
        schema: &serde_json::Value,
        use_cache: bool,
    ) -> Result<LlmResponse, LlmError> {
        let hash = messages_hash(messages);

        if use_cache {
            match self.cache.get(&hash).await {
                Ok(Some(data)) => match serde_json::from_str::<LlmResponse>(&data) {
                    Ok(mut resp) => {
                        debug!(messages_hash = %hash, "LLM cache hit");
                        // a replayed answer costs nothing
                        resp.usage = None;
                        resp.cost = None;
                        return Ok(resp);
                    }
                    Err(e) => warn!(messages_hash = %hash, error = %e, "unreadable cache entry"),
                },
                Ok(None) => debug!(messages_hash = %hash, "LLM cache miss"),
                Err(e) => warn!(error = %e, "LLM cache lookup failed"),
            }
        }

        let resp = self.inner.send(messages, schema, use_cache).await?;

        match serde_json::to_string(&resp) {
            Ok(data) => {
                if let Err(e) = self.cache.put(&hash, &data).await {
                    warn!(error = %e, "could not store LLM response in cache");
                }
            }
            Err(e) => warn!(error = %e, "could not serialise LLM response for cache"),
        }
        Ok(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::report::{Cost, GroupReport, Usage};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct MemoryCache(Mutex<HashMap<String, String>>);

    #[async_trait]
    impl ResponseCache for MemoryCache {
        async fn get(&self, hash: &str) -> Result<Option<String>, CacheError> {
            Ok(self.0.lock().await.get(hash).cloned())
        }
        async fn put(&self, hash: &str, data: &str) -> Result<(), CacheError> {
            self.0.lock().await.insert(hash.to_string(), data.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingLlm(AtomicUsize);

    #[async_trait]
    impl LlmBackend for CountingLlm {
        async fn send(
            &self,
            _messages: &[Message],
            _schema: &serde_json::Value,
            _use_cache: bool,
        ) -> Result<LlmResponse, LlmError> {
            let n = self.0.fetch_add(1, Ordering::SeqCst) as i64;
            Ok(LlmResponse {
                result: Some(GroupReport {
                    group_id: Some(n.to_string()),
                    ..Default::default()
                }),
                usage: Some(Usage {
                    total_tokens: Some(n),
                    ..Default::default()
                }),
                cost: Some(Cost {
                    total_rub: Some(0.75),
                    currency: None,
                }),
            })
        }
    }

    #[test]
    fn test_hash_depends_on_order_and_content() {
        let a = vec![Message::new("system", "s"), Message::new("user", "u")];
        let b = vec![Message::new("user", "u"), Message::new("system", "s")];
        assert_eq!(messages_hash(&a), messages_hash(&a.clone()));
        assert_ne!(messages_hash(&a), messages_hash(&b));
        assert_eq!(messages_hash(&a).len(), 64);
    }

    #[tokio::test]
    async fn test_cache_read_only_when_enabled() {
        let backend = Arc::new(CountingLlm::default());
        let cache = Arc::new(MemoryCache::default());
        let llm = CachedLlm::new(backend.clone(), cache.clone());
        let messages = vec![Message::new("user", "проверь")];
        let schema = serde_json::json!({});

        let first = llm.send(&messages, &schema, false).await.unwrap();
        let second = llm.send(&messages, &schema, false).await.unwrap();
        assert_eq!((first.tokens(), second.tokens()), (Some(0), Some(1)));
        assert_eq!(cache.0.lock().await.len(), 1);

        let cached = llm.send(&messages, &schema, true).await.unwrap();
        assert_eq!(backend.0.load(Ordering::SeqCst), 2);
        assert_eq!(
            cached.result.and_then(|r| r.group_id).as_deref(),
            Some("1")
        );
    }

    #[tokio::test]
    async fn test_cache_hit_reports_no_spend() {
        let backend = Arc::new(CountingLlm::default());
        let llm = CachedLlm::new(backend.clone(), Arc::new(MemoryCache::default()));
        let messages = vec![Message::new("user", "проверь")];
        let schema = serde_json::json!({});

        let fresh = llm.send(&messages, &schema, true).await.unwrap();
        assert_eq!(fresh.cost_rub(), Some(0.75));

        let replay = llm.send(&messages, &schema, true).await.unwrap();
        assert_eq!(backend.0.load(Ordering::SeqCst), 1);
        assert!(replay.result.is_some());
        assert_eq!(replay.tokens(), None);
        assert_eq!(replay.cost_rub(), None);
    }
}
