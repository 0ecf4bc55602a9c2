//! Clients for the upstream services the pipeline calls.
//!
//! Each service sits behind a trait so the pipeline can be driven with
//! in-process fakes; the reqwest implementations live in the submodules.

pub mod markdown;
pub mod prompt_builder;
pub mod report_generator;
pub mod word_parser;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::PromptItem;
use crate::models::{InvalidFinding, Mapping, MissingFinding};

pub use markdown::MarkdownClient;
pub use prompt_builder::PromptBuilderClient;
pub use report_generator::{ReportGeneratorClient, DOCX_MIME};
pub use word_parser::WordParserClient;

/// Errors returned by upstream service clients.
///
/// Response bodies are logged at debug level and never carried here.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{service}: request failed: {message}")]
    Transport {
        service: &'static str,
        message: String,
    },
    #[error("{service}: unexpected status {status}")]
    Status { service: &'static str, status: u16 },
    #[error("{service}: invalid response: {message}")]
    Parse {
        service: &'static str,
        message: String,
    },
    #[error("{service}: request rejected: {detail}")]
    Validation {
        service: &'static str,
        detail: String,
    },
    #[error("{service}: unexpected content type {content_type:?}")]
    ContentType {
        service: &'static str,
        content_type: String,
    },
}

impl ServiceError {
    pub(crate) fn transport(service: &'static str, e: impl std::fmt::Display) -> Self {
        Self::Transport {
            service,
            message: e.to_string(),
        }
    }

    pub(crate) fn parse(service: &'static str, e: impl std::fmt::Display) -> Self {
        Self::Parse {
            service,
            message: e.to_string(),
        }
    }
}

/// Output of the word parser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConvertedHtml {
    pub html: String,
    #[serde(default)]
    pub css: String,
}

/// Output of the Markdown service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkdownDocument {
    #[serde(default)]
    pub markdown: String,
    /// The input HTML with a `data-mapping-id` on every mapped block.
    #[serde(default)]
    pub html_with_ids: String,
    #[serde(default)]
    pub mappings: Vec<Mapping>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Output of the prompt builder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptSet {
    #[serde(default)]
    pub ggid: Option<i64>,
    #[serde(default)]
    pub items: Vec<PromptItem>,
    /// JSON schema every LLM answer must follow.
    #[serde(default)]
    pub schema: Option<serde_json::Value>,
}

impl PromptSet {
    /// The schema, unless absent or JSON null.
    pub fn schema(&self) -> Option<&serde_json::Value> {
        self.schema.as_ref().filter(|s| !s.is_null())
    }
}

/// One error group as the report generator expects it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportError {
    pub id: String,
    pub group_id: String,
    pub error_code: String,
    pub order_number: i64,
    pub name: Option<String>,
    pub description: Option<String>,
    pub verdict: Option<String>,
    pub preliminary_notes: Option<String>,
    pub overall_critique: Option<String>,
    pub process_analysis: Option<String>,
    pub process_critique: Option<String>,
    pub process_verification: Option<String>,
    pub process_retrieval: Vec<String>,
    pub instances: serde_json::Value,
    pub invalid_instances: Vec<InvalidFinding>,
    pub missing_instances: Vec<MissingFinding>,
}

/// A rendered DOCX report.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedReport {
    pub data: Vec<u8>,
    pub filename: String,
}

/// DOCX to HTML conversion.
#[async_trait]
pub trait WordParser: Send + Sync {
    async fn convert(&self, file: &[u8], filename: &str) -> Result<ConvertedHtml, ServiceError>;
}

/// HTML to Markdown conversion with a block mapping.
#[async_trait]
pub trait MarkdownConverter: Send + Sync {
    async fn convert(&self, html: &str) -> Result<MarkdownDocument, ServiceError>;
}

/// Builds the prompt set for a document.
#[async_trait]
pub trait PromptBuilder: Send + Sync {
    async fn build(&self, markdown: &str, gg_id: i64) -> Result<PromptSet, ServiceError>;
}

/// Renders the DOCX report for a set of error groups.
#[async_trait]
pub trait ReportRenderer: Send + Sync {
    async fn render(&self, errors: &[ReportError]) -> Result<RenderedReport, ServiceError>;
}

/// `detail` body of a 422 response.
#[derive(Debug, Deserialize)]
pub(crate) struct ValidationBody {
    #[serde(default)]
    detail: Vec<ValidationDetail>,
}

#[derive(Debug, Deserialize)]
struct ValidationDetail {
    #[serde(default)]
    loc: Vec<serde_json::Value>,
    #[serde(default)]
    msg: String,
}

impl ValidationBody {
    /// Join the detail entries into one line, e.g. `body.errors: field required`.
    pub(crate) fn message(&self) -> String {
        self.detail
            .iter()
            .map(|d| {
                let loc: Vec<String> = d
                    .loc
                    .iter()
                    .map(|v| match v {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect();
                if loc.is_empty() {
                    d.msg.clone()
                } else {
                    format!("{}: {}", loc.join("."), d.msg)
                }
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Map a non-success response to an error, logging the body.
pub(crate) async fn status_error(service: &'static str, resp: reqwest::Response) -> ServiceError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    tracing::debug!(service, %status, body = %body, "upstream service returned an error");

    if status == reqwest::StatusCode::UNPROCESSABLE_ENTITY {
        if let Ok(v) = serde_json::from_str::<ValidationBody>(&body) {
            let detail = v.message();
            if !detail.is_empty() {
                return ServiceError::Validation { service, detail };
            }
        }
    }
    ServiceError::Status {
        service,
        status: status.as_u16(),
    }
}

/// Build a reqwest client with the given timeout.
pub(crate) fn http_client(
    service: &'static str,
    timeout: std::time::Duration,
) -> Result<reqwest::Client, ServiceError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ServiceError::transport(service, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message() {
        let body: ValidationBody = serde_json::from_str(
            r#"{"detail":[{"loc":["body","errors",0],"msg":"field required","type":"missing"}]}"#,
        )
        .unwrap();
        assert_eq!(body.message(), "body.errors.0: field required");
    }

    #[test]
    fn test_null_schema_is_absent() {
        let set: PromptSet = serde_json::from_str(r#"{"ggid":1,"items":[],"schema":null}"#).unwrap();
        assert!(set.schema().is_none());
        let set: PromptSet = serde_json::from_str(r#"{"items":[],"schema":{"type":"object"}}"#).unwrap();
        assert!(set.schema().is_some());
    }
}
