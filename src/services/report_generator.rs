//! DOCX report generator client.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use super::{http_client, status_error, RenderedReport, ReportError, ReportRenderer, ServiceError};
use crate::llm::PromptItem;
use crate::models::{ErrorGroup, InvalidFinding, MissingFinding};

const SERVICE: &str = "report-generator";

/// The only content type accepted from the generator.
pub const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

const DEFAULT_FILENAME: &str = "report.docx";

static FILENAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"filename="([^"]+)""#).expect("valid regex"));

#[derive(Serialize)]
struct GenerateRequest<'a> {
    errors: &'a [ReportError],
}

pub struct ReportGeneratorClient {
    client: reqwest::Client,
    base_url: String,
}

impl ReportGeneratorClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ServiceError> {
        Ok(Self {
            client: http_client(SERVICE, timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

/// Filename from a `Content-Disposition` header value.
pub fn disposition_filename(header: Option<&str>) -> String {
    header
        .and_then(|h| FILENAME_RE.captures(h))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| DEFAULT_FILENAME.to_string())
}

#[async_trait]
impl ReportRenderer for ReportGeneratorClient {
    async fn render(&self, errors: &[ReportError]) -> Result<RenderedReport, ServiceError> {
        let resp = self
            .client
            .post(format!("{}/generate-report", self.base_url))
            .json(&GenerateRequest { errors })
            .send()
            .await
            .map_err(|e| ServiceError::transport(SERVICE, e))?;

        if !resp.status().is_success() {
            return Err(status_error(SERVICE, resp).await);
        }

        let headers = resp.headers();
        let content_type = headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if content_type != DOCX_MIME {
            return Err(ServiceError::ContentType {
                service: SERVICE,
                content_type,
            });
        }
        let filename = disposition_filename(
            headers
                .get(reqwest::header::CONTENT_DISPOSITION)
                .and_then(|v| v.to_str().ok()),
        );

        let data = resp
            .bytes()
            .await
            .map_err(|e| ServiceError::transport(SERVICE, e))?
            .to_vec();
        debug!(filename = %filename, bytes = data.len(), "report rendered");
        Ok(RenderedReport { data, filename })
    }
}

/// Build the generator payload from code-sorted error groups.
///
/// `order_number` is the position in `groups`. Group names and descriptions
/// come from the prompt item with the same group id.
pub fn report_errors(
    groups: &[ErrorGroup],
    invalid: &[InvalidFinding],
    missing: &[MissingFinding],
    prompts: &[PromptItem],
) -> Vec<ReportError> {
    groups
        .iter()
        .enumerate()
        .map(|(n, g)| {
            let prompt = prompts
                .iter()
                .find(|p| p.group_id.as_deref() == Some(g.group_id.as_str()));
            ReportError {
                id: g.id.clone(),
                group_id: g.group_id.clone(),
                error_code: g.error_code.clone(),
                order_number: n as i64,
                name: prompt.and_then(|p| p.group_name.clone()),
                description: prompt.and_then(|p| p.group_description.clone()),
                verdict: g.verdict.clone(),
                preliminary_notes: g.preliminary_notes.clone(),
                overall_critique: g.overall_critique.clone(),
                process_analysis: g.process_analysis.clone(),
                process_critique: g.process_critique.clone(),
                process_verification: g.process_verification.clone(),
                process_retrieval: g.process_retrieval.clone(),
                instances: g.instances.clone(),
                invalid_instances: invalid.iter().filter(|f| f.error_id == g.id).cloned().collect(),
                missing_instances: missing.iter().filter(|f| f.error_id == g.id).cloned().collect(),
            }
        })
        .collect()
}
