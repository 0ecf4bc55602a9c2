//! In-memory stand-ins for every upstream seam of the pipeline.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;

use tzcheck::llm::{LlmBackend, LlmError, LlmResponse, Message, PromptItem};
use tzcheck::models::Mapping;
use tzcheck::pipeline::{Coordinator, Pipeline, PipelineServices, RunSettings};
use tzcheck::repository::DbContext;
use tzcheck::service::TzService;
use tzcheck::services::{
    ConvertedHtml, MarkdownConverter, MarkdownDocument, PromptBuilder, PromptSet,
    RenderedReport, ReportError, ReportRenderer, ServiceError, WordParser,
};
use tzcheck::storage::{ObjectStore, StorageError};

pub const BLOCK_A: &str =
    r#"<p data-mapping-id="b0">Система должна работать круглосуточно без перерывов.</p>"#;
pub const BLOCK_B: &str = r#"<p data-mapping-id="b1"><span>Это</span> <span>тест</span> <span>множественных</span> <span>span</span></p>"#;

pub fn html_with_ids() -> String {
    format!("<html><body>{}{}</body></html>", BLOCK_A, BLOCK_B)
}

pub fn mappings() -> Vec<Mapping> {
    vec![
        Mapping {
            element_id: Some("b0".into()),
            html_tag: "p".into(),
            html_content: BLOCK_A.into(),
            md_start_line: 1,
            md_end_line: 1,
            md_content: "Система должна работать круглосуточно без перерывов.".into(),
        },
        Mapping {
            element_id: Some("b1".into()),
            html_tag: "p".into(),
            html_content: BLOCK_B.into(),
            md_start_line: 3,
            md_end_line: 3,
            md_content: "Это тест множественных span".into(),
        },
    ]
}

pub fn prompt(group_id: &str, key: &str) -> PromptItem {
    PromptItem {
        group_id: Some(group_id.into()),
        group_name: Some(format!("Группа {group_id}")),
        group_description: None,
        error_code_ids: vec![],
        messages: vec![Message::new("user", key)],
    }
}

pub fn response(value: serde_json::Value) -> LlmResponse {
    serde_json::from_value(value).unwrap()
}

/// Group 1 reports one invalid and one missing instance under E2.
pub fn group_one_response() -> LlmResponse {
    response(json!({
        "result": {
            "group_id": "1",
            "errors": [{
                "code": "E2",
                "verdict": "error_present",
                "process": {"analysis": "разбор", "retrieval": [{"text": "Это тест"}]},
                "instances": [
                    {"err_type": "invalid", "snippet": "тест множественных span",
                     "line_start": 3, "line_end": 3, "suggested_fix": "уточнить"},
                    {"err_type": "missing", "suggested_fix": "добавить раздел о надёжности"}
                ]
            }]
        },
        "usage": {"total_tokens": 100},
        "cost": {"total_rub": 1.5}
    }))
}

/// Group 2 reports one invalid instance under E1.
pub fn group_two_response() -> LlmResponse {
    response(json!({
        "result": {
            "group_id": "2",
            "errors": [{
                "code": "E1",
                "instances": [
                    {"err_type": "invalid", "snippet": "**Система должна работать**",
                     "line_start": 1, "line_end": 1, "rationale": "неизмеримо"}
                ]
            }]
        },
        "usage": {"total_tokens": 50},
        "cost": {"total_rub": 0.5}
    }))
}

pub struct FakeWordParser {
    pub html: String,
}

#[async_trait]
impl WordParser for FakeWordParser {
    async fn convert(&self, _file: &[u8], _filename: &str) -> Result<ConvertedHtml, ServiceError> {
        Ok(ConvertedHtml {
            html: self.html.clone(),
            css: "p { margin: 0; }".into(),
        })
    }
}

pub struct FakeMarkdown;

#[async_trait]
impl MarkdownConverter for FakeMarkdown {
    async fn convert(&self, _html: &str) -> Result<MarkdownDocument, ServiceError> {
        Ok(MarkdownDocument {
            markdown: "Система должна работать круглосуточно без перерывов.\n\nЭто тест множественных span\n"
                .into(),
            html_with_ids: html_with_ids(),
            mappings: mappings(),
            message: None,
        })
    }
}

pub struct FakePromptBuilder {
    pub items: Vec<PromptItem>,
    pub schema: Option<serde_json::Value>,
    pub seen_gg_id: Mutex<Option<i64>>,
}

impl FakePromptBuilder {
    pub fn new(items: Vec<PromptItem>) -> Self {
        Self {
            items,
            schema: Some(json!({"type": "object"})),
            seen_gg_id: Mutex::new(None),
        }
    }
}

#[async_trait]
impl PromptBuilder for FakePromptBuilder {
    async fn build(&self, _markdown: &str, gg_id: i64) -> Result<PromptSet, ServiceError> {
        *self.seen_gg_id.lock().unwrap() = Some(gg_id);
        Ok(PromptSet {
            ggid: Some(gg_id),
            items: self.items.clone(),
            schema: self.schema.clone(),
        })
    }
}

/// Answers by the content of the first message; unknown prompts fail.
#[derive(Default)]
pub struct ScriptedLlm {
    pub answers: HashMap<String, LlmResponse>,
    pub delay: Option<Duration>,
}

impl ScriptedLlm {
    pub fn with(mut self, key: &str, resp: LlmResponse) -> Self {
        self.answers.insert(key.into(), resp);
        self
    }
}

#[async_trait]
impl LlmBackend for ScriptedLlm {
    async fn send(
        &self,
        messages: &[Message],
        _schema: &serde_json::Value,
        _use_cache: bool,
    ) -> Result<LlmResponse, LlmError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let key = messages.first().map(|m| m.content.as_str()).unwrap_or("");
        self.answers
            .get(key)
            .cloned()
            .ok_or_else(|| LlmError::Api(format!("no answer for {key}")))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    pub objects: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.objects.lock().unwrap().insert(key.into(), data.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.into()))
    }
}

/// Records the payload and returns a fixed document, or fails when asked to.
#[derive(Default)]
pub struct FakeRenderer {
    pub fail: bool,
    pub payload: Mutex<Vec<ReportError>>,
}

#[async_trait]
impl ReportRenderer for FakeRenderer {
    async fn render(&self, errors: &[ReportError]) -> Result<RenderedReport, ServiceError> {
        if self.fail {
            return Err(ServiceError::Status {
                service: "report-generator",
                status: 502,
            });
        }
        *self.payload.lock().unwrap() = errors.to_vec();
        Ok(RenderedReport {
            data: b"PK-docx".to_vec(),
            filename: "report.docx".into(),
        })
    }
}

pub struct Harness {
    pub pipeline: Pipeline,
    pub db: DbContext,
    pub store: Arc<MemoryStore>,
    pub prompt_builder: Arc<FakePromptBuilder>,
    pub renderer: Arc<FakeRenderer>,
    _dir: TempDir,
}

impl Harness {
    /// The pipeline behind the service facade; the tempdir must outlive it.
    pub fn into_service(self) -> (TzService, TempDir) {
        (TzService::new(self.pipeline, self.db), self._dir)
    }
}

pub async fn harness(
    html: &str,
    prompt_builder: FakePromptBuilder,
    llm: ScriptedLlm,
    renderer: FakeRenderer,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let db = DbContext::new(&dir.path().join("tz.db"));
    db.init_schema().await.unwrap();

    let store = Arc::new(MemoryStore::default());
    let prompt_builder = Arc::new(prompt_builder);
    let renderer = Arc::new(renderer);
    let services = PipelineServices {
        word_parser: Arc::new(FakeWordParser { html: html.into() }),
        markdown: Arc::new(FakeMarkdown),
        prompt_builder: prompt_builder.clone(),
        llm: Arc::new(llm),
        report_renderer: Some(renderer.clone()),
        store: store.clone(),
    };
    let coordinator = Arc::new(Coordinator::new(RunSettings::default()));
    Harness {
        pipeline: Pipeline::new(services, db.clone(), coordinator),
        db,
        store,
        prompt_builder,
        renderer,
        _dir: dir,
    }
}
