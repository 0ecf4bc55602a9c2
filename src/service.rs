//! Thin service layer over the pipeline and the repositories.
//!
//! This is what an API or the CLI talks to: `check_tz`, `get_version`,
//! `new_feedback_error` and the read-only admin reports.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::Settings;
use crate::llm::{CachedLlm, LlmClient};
use crate::models::{FeedbackEntry, FeedbackUpdate, VersionDetail};
use crate::pipeline::{
    CheckRequest, CheckResult, Coordinator, Pipeline, PipelineError, PipelineEvent,
    PipelineServices,
};
use crate::repository::{AnalyticsRepository, DbContext, DbError, FeedbackError};
use crate::services::{
    MarkdownClient, PromptBuilderClient, ReportGeneratorClient, ReportRenderer, WordParserClient,
};

pub struct TzService {
    pipeline: Pipeline,
    db: DbContext,
}

impl TzService {
    pub fn new(pipeline: Pipeline, db: DbContext) -> Self {
        Self { pipeline, db }
    }

    /// Wire the HTTP clients, the cached LLM backend and the object store
    /// from settings.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let db = settings.create_db_context();
        let services = &settings.services;

        let llm = Arc::new(LlmClient::new(settings.llm.clone())?);
        let cache = Arc::new(db.llm_cache());

        let report_renderer: Option<Arc<dyn ReportRenderer>> =
            match (&services.report_generator_url, settings.pipeline.render_report) {
                (Some(url), true) => Some(Arc::new(ReportGeneratorClient::new(
                    url,
                    services.report_generator_timeout(),
                )?)),
                _ => None,
            };

        let pipeline_services = PipelineServices {
            word_parser: Arc::new(WordParserClient::new(
                &services.word_parser_url,
                services.word_parser_timeout(),
            )?),
            markdown: Arc::new(MarkdownClient::new(
                &services.markdown_url,
                services.markdown_timeout(),
            )?),
            prompt_builder: Arc::new(PromptBuilderClient::new(
                &services.prompt_builder_url,
                services.prompt_builder_timeout(),
            )?),
            llm: Arc::new(CachedLlm::new(llm, cache)),
            report_renderer,
            store: Arc::new(settings.object_store()),
        };

        let coordinator = Arc::new(Coordinator::new(settings.run_settings()));
        let pipeline = Pipeline::new(pipeline_services, db.clone(), coordinator);
        Ok(Self::new(pipeline, db))
    }

    pub fn db(&self) -> &DbContext {
        &self.db
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        self.pipeline.coordinator()
    }

    /// Run the whole pipeline for one uploaded document.
    pub async fn check_tz(
        &self,
        file: Vec<u8>,
        filename: &str,
        user_id: &str,
        events: Option<mpsc::Sender<PipelineEvent>>,
    ) -> Result<CheckResult, PipelineError> {
        let request = CheckRequest {
            file,
            filename: filename.to_string(),
            user_id: user_id.to_string(),
        };
        self.pipeline.check_tz(&request, events).await
    }

    /// Like [`check_tz`](Self::check_tz), cancelled when `cancel` resolves.
    pub async fn check_tz_until<F>(
        &self,
        request: &CheckRequest,
        events: Option<mpsc::Sender<PipelineEvent>>,
        cancel: F,
    ) -> Result<CheckResult, PipelineError>
    where
        F: std::future::Future<Output = ()>,
    {
        self.pipeline.check_tz_until(request, events, cancel).await
    }

    pub async fn get_version(&self, version_id: &str) -> Result<Option<VersionDetail>, DbError> {
        self.db.runs().get_version(version_id).await
    }

    pub async fn new_feedback_error(&self, update: &FeedbackUpdate) -> Result<(), FeedbackError> {
        self.db.feedback().update_instance_feedback(update).await
    }

    pub async fn feedbacks(&self, user_id: Option<&str>) -> Result<Vec<FeedbackEntry>, DbError> {
        self.db.feedback().feedbacks(user_id).await
    }

    pub fn analytics(&self) -> AnalyticsRepository {
        self.db.analytics()
    }
}
