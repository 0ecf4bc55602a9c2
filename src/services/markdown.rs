//! HTML to Markdown service client.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use super::{http_client, status_error, MarkdownConverter, MarkdownDocument, ServiceError};

const SERVICE: &str = "markdown-service";

#[derive(Serialize)]
struct ConvertRequest<'a> {
    html_text: &'a str,
}

pub struct MarkdownClient {
    client: reqwest::Client,
    base_url: String,
}

impl MarkdownClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ServiceError> {
        Ok(Self {
            client: http_client(SERVICE, timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MarkdownConverter for MarkdownClient {
    async fn convert(&self, html: &str) -> Result<MarkdownDocument, ServiceError> {
        let resp = self
            .client
            .post(format!("{}/api/v1/convert", self.base_url))
            .json(&ConvertRequest { html_text: html })
            .send()
            .await
            .map_err(|e| ServiceError::transport(SERVICE, e))?;

        if !resp.status().is_success() {
            return Err(status_error(SERVICE, resp).await);
        }

        let doc: MarkdownDocument = resp
            .json()
            .await
            .map_err(|e| ServiceError::parse(SERVICE, e))?;
        debug!(
            mappings = doc.mappings.len(),
            markdown_len = doc.markdown.len(),
            message = ?doc.message,
            "HTML converted to Markdown"
        );
        Ok(doc)
    }
}
