//! Prompt builder client.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use super::{http_client, status_error, PromptBuilder, PromptSet, ServiceError};

const SERVICE: &str = "prompt-builder";

#[derive(Serialize)]
struct BuildRequest<'a> {
    markdown: &'a str,
    ggid: i64,
}

pub struct PromptBuilderClient {
    client: reqwest::Client,
    url: String,
}

impl PromptBuilderClient {
    /// `url` is the full endpoint; the service answers on its root path.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ServiceError> {
        Ok(Self {
            client: http_client(SERVICE, timeout)?,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl PromptBuilder for PromptBuilderClient {
    async fn build(&self, markdown: &str, gg_id: i64) -> Result<PromptSet, ServiceError> {
        let resp = self
            .client
            .post(&self.url)
            .json(&BuildRequest {
                markdown,
                ggid: gg_id,
            })
            .send()
            .await
            .map_err(|e| ServiceError::transport(SERVICE, e))?;

        if !resp.status().is_success() {
            return Err(status_error(SERVICE, resp).await);
        }

        let set: PromptSet = resp
            .json()
            .await
            .map_err(|e| ServiceError::parse(SERVICE, e))?;
        debug!(gg_id, prompts = set.items.len(), has_schema = set.schema().is_some(), "prompts built");
        Ok(set)
    }
}
