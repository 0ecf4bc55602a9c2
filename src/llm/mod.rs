//! LLM access: requester client, response cache and prompt fan-out.

pub mod cache;
pub mod client;
pub mod fanout;
pub mod report;

use async_trait::async_trait;

pub use cache::{messages_hash, CacheError, CachedLlm, ResponseCache};
pub use client::{LlmClient, LlmConfig, LlmError};
pub use fanout::{run_prompts, FanoutObserver, FanoutOutcome, IndexedReport, TaskFinished};
pub use report::{GroupReport, LlmResponse, Message, PromptItem};

/// Anything that can answer a prompt.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Send `messages` with the answer `schema`. `use_cache` lets caching
    /// backends answer from stored responses.
    async fn send(
        &self,
        messages: &[Message],
        schema: &serde_json::Value,
        use_cache: bool,
    ) -> Result<LlmResponse, LlmError>;
}
