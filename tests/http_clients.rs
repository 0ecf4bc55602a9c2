//! Service clients against a local HTTP server.

use std::collections::HashMap;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::Query;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use tzcheck::services::{
    MarkdownClient, MarkdownConverter, PromptBuilder, PromptBuilderClient, ReportError,
    ReportGeneratorClient, ReportRenderer, ServiceError, WordParser, WordParserClient, DOCX_MIME,
};

const TIMEOUT: Duration = Duration::from_secs(5);

/// Serve `app` on an ephemeral port and return its base URL.
async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn convert_json(Query(q): Query<HashMap<String, String>>, body: Bytes) -> impl IntoResponse {
    assert_eq!(q.get("format").map(String::as_str), Some("html"));
    let body = String::from_utf8_lossy(&body);
    assert!(body.contains("name=\"file\""));
    assert!(body.contains("spec.docx"));
    Json(json!({"html": "<p>Текст</p>", "css": "p { color: red; }"}))
}

async fn convert_raw(_body: Bytes) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], "<p>Только HTML</p>")
}

#[tokio::test]
async fn test_word_parser_json_body() {
    let base = serve(Router::new().route("/api/v1/convert", post(convert_json))).await;
    let client = WordParserClient::new(&base, TIMEOUT).unwrap();

    let out = client.convert(b"PK\x03\x04", "spec.docx").await.unwrap();
    assert_eq!(out.html, "<p>Текст</p>");
    assert_eq!(out.css, "p { color: red; }");
}

#[tokio::test]
async fn test_word_parser_raw_html_body() {
    let base = serve(Router::new().route("/api/v1/convert", post(convert_raw))).await;
    let client = WordParserClient::new(&format!("{base}/"), TIMEOUT).unwrap();

    let out = client.convert(b"PK", "spec.docx").await.unwrap();
    assert_eq!(out.html, "<p>Только HTML</p>");
    assert!(out.css.is_empty());
}

#[tokio::test]
async fn test_markdown_client_reads_mappings() {
    async fn handler(Json(body): Json<Value>) -> Json<Value> {
        assert_eq!(body["html_text"], "<p>Текст</p>");
        Json(json!({
            "markdown": "Текст\n",
            "html_with_ids": "<p data-mapping-id=\"b0\">Текст</p>",
            "mappings": [{
                "html_element_id": "b0",
                "html_tag": "p",
                "html_content": "<p data-mapping-id=\"b0\">Текст</p>",
                "markdown_line_start": 1,
                "markdown_line_end": 1,
                "markdown_content": "Текст"
            }],
            "message": "ok"
        }))
    }
    let base = serve(Router::new().route("/api/v1/convert", post(handler))).await;
    let client = MarkdownClient::new(&base, TIMEOUT).unwrap();

    let doc = client.convert("<p>Текст</p>").await.unwrap();
    assert_eq!(doc.markdown, "Текст\n");
    assert_eq!(doc.mappings.len(), 1);
    assert_eq!(doc.mappings[0].element_id.as_deref(), Some("b0"));
    assert_eq!(doc.mappings[0].md_start_line, 1);
    assert_eq!(doc.message.as_deref(), Some("ok"));
}

#[tokio::test]
async fn test_prompt_builder_sends_ggid() {
    async fn handler(Json(body): Json<Value>) -> Json<Value> {
        assert_eq!(body["ggid"], 7);
        assert_eq!(body["markdown"], "# ТЗ");
        Json(json!({
            "ggid": 7,
            "items": [{
                "group_id": 3,
                "group_name": "Надёжность",
                "error_code_ids": [1, 2],
                "messages": [{"role": "system", "content": "проверь"}]
            }],
            "schema": {"type": "object"}
        }))
    }
    let base = serve(Router::new().route("/", post(handler))).await;
    let client = PromptBuilderClient::new(&format!("{base}/"), TIMEOUT).unwrap();

    let set = client.build("# ТЗ", 7).await.unwrap();
    assert_eq!(set.ggid, Some(7));
    assert_eq!(set.items.len(), 1);
    assert_eq!(set.items[0].group_id.as_deref(), Some("3"));
    assert_eq!(set.items[0].messages[0].content, "проверь");
    assert!(set.schema().is_some());
}

#[tokio::test]
async fn test_validation_detail_is_reported() {
    async fn handler() -> impl IntoResponse {
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"detail": [{"loc": ["body", "markdown"], "msg": "field required"}]})),
        )
    }
    let base = serve(Router::new().route("/", post(handler))).await;
    let client = PromptBuilderClient::new(&format!("{base}/"), TIMEOUT).unwrap();

    match client.build("", 1).await {
        Err(ServiceError::Validation { service, detail }) => {
            assert_eq!(service, "prompt-builder");
            assert_eq!(detail, "body.markdown: field required");
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_non_success_status() {
    async fn handler() -> impl IntoResponse {
        (StatusCode::BAD_GATEWAY, "upstream down")
    }
    let base = serve(Router::new().route("/api/v1/convert", post(handler))).await;
    let client = MarkdownClient::new(&base, TIMEOUT).unwrap();

    let err = client.convert("<p/>").await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Status {
            service: "markdown-service",
            status: 502
        }
    ));
    assert!(!err.to_string().contains("upstream down"));
}

#[tokio::test]
async fn test_report_generator_reads_filename() {
    async fn handler(Json(body): Json<Value>) -> impl IntoResponse {
        assert_eq!(body["errors"][0]["error_code"], "E1");
        (
            [
                (header::CONTENT_TYPE, DOCX_MIME),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"report-42.docx\"",
                ),
            ],
            b"PK-report".to_vec(),
        )
    }
    let base = serve(Router::new().route("/generate-report", post(handler))).await;
    let client = ReportGeneratorClient::new(&base, TIMEOUT).unwrap();

    let errors = vec![ReportError {
        id: "e-1".into(),
        group_id: "1".into(),
        error_code: "E1".into(),
        ..Default::default()
    }];
    let report = client.render(&errors).await.unwrap();
    assert_eq!(report.filename, "report-42.docx");
    assert_eq!(report.data, b"PK-report");
}

#[tokio::test]
async fn test_report_generator_rejects_other_content_types() {
    async fn handler() -> impl IntoResponse {
        ([(header::CONTENT_TYPE, "application/json")], "{}")
    }
    let base = serve(Router::new().route("/generate-report", post(handler))).await;
    let client = ReportGeneratorClient::new(&base, TIMEOUT).unwrap();

    let err = client.render(&[]).await.unwrap_err();
    match err {
        ServiceError::ContentType { content_type, .. } => {
            assert_eq!(content_type, "application/json")
        }
        other => panic!("expected content type error, got {other:?}"),
    }
}
