//! DOCX to HTML converter client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use tracing::debug;

use super::{http_client, status_error, ConvertedHtml, ServiceError, WordParser};

const SERVICE: &str = "word-parser";

pub struct WordParserClient {
    client: reqwest::Client,
    base_url: String,
}

impl WordParserClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ServiceError> {
        Ok(Self {
            client: http_client(SERVICE, timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

/// Accept either a `{html, css}` JSON body or a bare HTML body.
fn parse_body(content_type: &str, body: String) -> Result<ConvertedHtml, ServiceError> {
    let looks_json = content_type.contains("json") || body.trim_start().starts_with('{');
    if looks_json {
        return serde_json::from_str(&body).map_err(|e| ServiceError::parse(SERVICE, e));
    }
    Ok(ConvertedHtml {
        html: body,
        css: String::new(),
    })
}

#[async_trait]
impl WordParser for WordParserClient {
    async fn convert(&self, file: &[u8], filename: &str) -> Result<ConvertedHtml, ServiceError> {
        let part = Part::bytes(file.to_vec()).file_name(filename.to_string());
        let form = Form::new().part("file", part);

        let resp = self
            .client
            .post(format!("{}/api/v1/convert", self.base_url))
            .query(&[("format", "html")])
            .multipart(form)
            .send()
            .await
            .map_err(|e| ServiceError::transport(SERVICE, e))?;

        if !resp.status().is_success() {
            return Err(status_error(SERVICE, resp).await);
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = resp
            .text()
            .await
            .map_err(|e| ServiceError::transport(SERVICE, e))?;

        let converted = parse_body(&content_type, body)?;
        debug!(
            filename,
            html_len = converted.html.len(),
            css_len = converted.css.len(),
            "document converted to HTML"
        );
        Ok(converted)
    }
}
