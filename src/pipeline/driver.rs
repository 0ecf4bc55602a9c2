//! One run of the inspection pipeline.
//!
//! A run stores the upload, opens an `in_progress` version, then walks the
//! steps of [`PipelineState`]. Everything up to `HTML_ANNOTATED` happens in
//! memory and can be cancelled; the outcome is written in a single
//! transaction. A failure at any step marks the version `failed` with the
//! error's code.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{llm_progress, Coordinator, PipelineError, PipelineEvent, PipelineState, RunSettings};
use crate::annotate::audit::AuditEntry;
use crate::annotate::{annotate_document, audit_tsv};
use crate::findings::{apply_document_order, assemble, sort_by_code};
use crate::llm::{run_prompts, FanoutObserver, LlmBackend, TaskFinished};
use crate::models::{ErrorGroup, InvalidFinding, MissingFinding};
use crate::repository::{CompletedRun, DbContext, RunHandle, RunRepository};
use crate::services::report_generator::report_errors;
use crate::services::{MarkdownConverter, PromptBuilder, ReportRenderer, WordParser};
use crate::storage::{docx_key, report_key, ObjectStore};

/// The collaborators a run calls out to.
#[derive(Clone)]
pub struct PipelineServices {
    pub word_parser: Arc<dyn WordParser>,
    pub markdown: Arc<dyn MarkdownConverter>,
    pub prompt_builder: Arc<dyn PromptBuilder>,
    pub llm: Arc<dyn LlmBackend>,
    /// `None` skips the report step.
    pub report_renderer: Option<Arc<dyn ReportRenderer>>,
    pub store: Arc<dyn ObjectStore>,
}

/// An uploaded document.
#[derive(Debug, Clone)]
pub struct CheckRequest {
    pub file: Vec<u8>,
    pub filename: String,
    pub user_id: String,
}

/// Result of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub version_id: String,
    pub version_number: i64,
    pub out_html: String,
    pub css: String,
    pub errors: Vec<ErrorGroup>,
    pub invalid_instances: Vec<InvalidFinding>,
    pub missing_instances: Vec<MissingFinding>,
    pub audit: Vec<AuditEntry>,
    pub cost_total_rub: Option<f64>,
    pub tokens_total: Option<i64>,
    pub inspection_duration_ms: u64,
    pub report_file_id: Option<String>,
}

impl CheckResult {
    pub fn audit_tsv(&self) -> String {
        audit_tsv(&self.audit)
    }
}

/// Specification name for an uploaded file: the filename without `.docx`.
pub fn document_name(filename: &str) -> &str {
    let len = filename.len();
    if len >= 5
        && filename.is_char_boundary(len - 5)
        && filename[len - 5..].eq_ignore_ascii_case(".docx")
    {
        &filename[..len - 5]
    } else {
        filename
    }
}

/// Everything the in-memory steps produce.
struct Analysis {
    out_html: String,
    css: String,
    errors: Vec<ErrorGroup>,
    invalid: Vec<InvalidFinding>,
    missing: Vec<MissingFinding>,
    audit: Vec<AuditEntry>,
    cost_total_rub: Option<f64>,
    tokens_total: Option<i64>,
    llm_report: Option<serde_json::Value>,
    prompts: Vec<crate::llm::PromptItem>,
}

/// Reports step completions to the database and the event channel.
struct Progress<'a> {
    runs: RunRepository,
    version_id: &'a str,
    events: Option<&'a mpsc::Sender<PipelineEvent>>,
}

impl Progress<'_> {
    async fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = self.events {
            let _ = tx.send(event).await;
        }
    }

    async fn set(&self, progress: i32) {
        if let Err(e) = self.runs.update_progress(self.version_id, progress).await {
            warn!(version_id = %self.version_id, error = %e, "could not update progress");
        }
    }

    async fn step(&self, state: PipelineState) {
        let Some(progress) = state.progress() else {
            return;
        };
        if progress < 100 {
            self.set(progress).await;
        }
        info!(version_id = %self.version_id, step = state.as_str(), progress, "pipeline step completed");
        self.emit(PipelineEvent::StepCompleted { state, progress }).await;
    }
}

#[async_trait]
impl<'a> FanoutObserver for Progress<'a> {
    async fn task_finished(&self, finished: TaskFinished) {
        self.set(llm_progress(finished.completed, finished.total)).await;
        self.emit(PipelineEvent::LlmTaskFinished {
            index: finished.index,
            ok: finished.ok,
        })
        .await;
    }
}

/// Runs submissions through the pipeline.
pub struct Pipeline {
    services: PipelineServices,
    db: DbContext,
    coordinator: Arc<Coordinator>,
}

impl Pipeline {
    pub fn new(services: PipelineServices, db: DbContext, coordinator: Arc<Coordinator>) -> Self {
        Self {
            services,
            db,
            coordinator,
        }
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// Run a submission to completion.
    pub async fn check_tz(
        &self,
        request: &CheckRequest,
        events: Option<mpsc::Sender<PipelineEvent>>,
    ) -> Result<CheckResult, PipelineError> {
        self.check_tz_until(request, events, std::future::pending::<()>())
            .await
    }

    /// Run a submission, giving up with [`PipelineError::Cancelled`] if
    /// `cancel` resolves before the outcome is persisted.
    pub async fn check_tz_until<F>(
        &self,
        request: &CheckRequest,
        events: Option<mpsc::Sender<PipelineEvent>>,
        cancel: F,
    ) -> Result<CheckResult, PipelineError>
    where
        F: Future<Output = ()>,
    {
        let started = Instant::now();
        let settings = self.coordinator.snapshot();
        let name = document_name(&request.filename);
        info!(filename = %request.filename, user_id = %request.user_id, gg_id = settings.gg_id, "checking document");

        let file_key = docx_key();
        self.services.store.put(&file_key, &request.file).await?;
        let handle = self
            .db
            .runs()
            .begin_run(
                name,
                &request.user_id,
                Some(&file_key),
                Some(request.file.len() as i64),
            )
            .await?;

        let progress = Progress {
            runs: self.db.runs(),
            version_id: &handle.version_id,
            events: events.as_ref(),
        };
        progress.step(PipelineState::Received).await;

        let analysed = tokio::select! {
            result = self.analyse(request, settings, &progress) => result,
            _ = cancel => Err(PipelineError::Cancelled),
        };

        let result = match analysed {
            Ok(analysis) => {
                self.persist(request, name, &handle, analysis, started.elapsed(), &progress)
                    .await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            error!(version_id = %handle.version_id, code = e.code(), error = %e, "pipeline failed");
            if let Err(db_err) = self
                .db
                .runs()
                .mark_failed(&handle.version_id, e.code(), &e.to_string())
                .await
            {
                warn!(version_id = %handle.version_id, error = %db_err, "could not mark version failed");
            }
            progress.emit(PipelineEvent::Failed { code: e.code() }).await;
        }
        result
    }

    /// Conversion, prompting, LLM fan-out, assembly and annotation.
    async fn analyse(
        &self,
        request: &CheckRequest,
        settings: RunSettings,
        progress: &Progress<'_>,
    ) -> Result<Analysis, PipelineError> {
        let converted = self
            .services
            .word_parser
            .convert(&request.file, &request.filename)
            .await
            .map_err(|e| PipelineError::ConvertFailure(e.to_string()))?;
        if converted.html.trim().is_empty() {
            return Err(PipelineError::ConvertFailure("word parser returned empty HTML".into()));
        }
        progress.step(PipelineState::ConvertedHtml).await;

        let md = self
            .services
            .markdown
            .convert(&converted.html)
            .await
            .map_err(|e| PipelineError::ConvertFailure(e.to_string()))?;
        debug!(mappings = md.mappings.len(), message = ?md.message, "markdown received");
        progress.step(PipelineState::ConvertedMd).await;

        let prompts = self
            .services
            .prompt_builder
            .build(&md.markdown, settings.gg_id)
            .await
            .map_err(|e| PipelineError::LlmAnalyzeFailure(e.to_string()))?;
        let Some(schema) = prompts.schema() else {
            return Err(PipelineError::LlmAnalyzeFailure(
                "prompt builder returned no schema".into(),
            ));
        };
        info!(prompts = prompts.items.len(), "prompts built");
        progress.step(PipelineState::Prompted).await;

        let outcome = run_prompts(
            self.services.llm.clone(),
            &prompts.items,
            schema,
            settings.use_llm_cache,
            progress,
        )
        .await;
        // an empty prompt set is a clean document, not a failed analysis
        if !prompts.items.is_empty() && outcome.reports.is_empty() {
            return Err(PipelineError::LlmAnalyzeFailure(format!(
                "no group reports ({} of {} tasks failed)",
                outcome.failed,
                prompts.items.len()
            )));
        }
        progress.step(PipelineState::LlmDone).await;

        let mut assembly = assemble(&outcome.reports, &prompts.items);
        sort_by_code(&mut assembly.errors);
        progress.step(PipelineState::FindingsMaterialized).await;

        let base_html = if md.html_with_ids.is_empty() {
            &converted.html
        } else {
            &md.html_with_ids
        };
        let annotation = annotate_document(base_html, &md.mappings, &assembly.invalid);
        apply_document_order(&mut assembly.invalid, &annotation.document_order);
        info!(
            wrapped = annotation.wrapped_count(),
            invalid = assembly.invalid.len(),
            missing = assembly.missing.len(),
            "document annotated"
        );
        progress.step(PipelineState::HtmlAnnotated).await;

        let reports: Vec<_> = outcome.reports.iter().map(|r| &r.report).collect();
        let llm_report = serde_json::to_value(&reports).ok();

        Ok(Analysis {
            out_html: annotation.html,
            css: converted.css,
            errors: assembly.errors,
            invalid: assembly.invalid,
            missing: assembly.missing,
            audit: annotation.audit,
            cost_total_rub: outcome.cost_total_rub,
            tokens_total: outcome.tokens_total,
            llm_report,
            prompts: prompts.items,
        })
    }

    /// Store the outcome, then render the report if a renderer is configured.
    async fn persist(
        &self,
        request: &CheckRequest,
        name: &str,
        handle: &RunHandle,
        analysis: Analysis,
        inspection_duration: Duration,
        progress: &Progress<'_>,
    ) -> Result<CheckResult, PipelineError> {
        let runs = self.db.runs();
        runs.save_run(&CompletedRun {
            version_id: Some(&handle.version_id),
            name,
            user_id: &request.user_id,
            out_html: &analysis.out_html,
            css: &analysis.css,
            original_file_id: None,
            original_file_size: None,
            errors: &analysis.errors,
            invalid: &analysis.invalid,
            missing: &analysis.missing,
            cost_total_rub: analysis.cost_total_rub,
            tokens_total: analysis.tokens_total,
            inspection_duration,
            llm_report: analysis.llm_report.as_ref(),
        })
        .await?;
        progress.step(PipelineState::Persisted).await;

        let report_file_id = self.render_report(handle, &analysis).await;
        if report_file_id.is_some() {
            progress.step(PipelineState::ReportRendered).await;
        }
        progress.step(PipelineState::Done).await;

        info!(
            version_id = %handle.version_id,
            cost_rub = ?analysis.cost_total_rub,
            tokens = ?analysis.tokens_total,
            duration_ms = inspection_duration.as_millis() as u64,
            "check finished"
        );
        info!("localisation audit:\n{}", audit_tsv(&analysis.audit));

        Ok(CheckResult {
            version_id: handle.version_id.clone(),
            version_number: handle.version_number,
            out_html: analysis.out_html,
            css: analysis.css,
            errors: analysis.errors,
            invalid_instances: analysis.invalid,
            missing_instances: analysis.missing,
            audit: analysis.audit,
            cost_total_rub: analysis.cost_total_rub,
            tokens_total: analysis.tokens_total,
            inspection_duration_ms: inspection_duration.as_millis() as u64,
            report_file_id,
        })
    }

    /// Render and store the DOCX report. Failures are logged only.
    async fn render_report(&self, handle: &RunHandle, analysis: &Analysis) -> Option<String> {
        let renderer = self.services.report_renderer.as_ref()?;
        let payload = report_errors(
            &analysis.errors,
            &analysis.invalid,
            &analysis.missing,
            &analysis.prompts,
        );

        let report = match renderer.render(&payload).await {
            Ok(r) => r,
            Err(e) => {
                warn!(version_id = %handle.version_id, error = %e, "report rendering failed");
                return None;
            }
        };
        let key = report_key();
        if let Err(e) = self.services.store.put(&key, &report.data).await {
            warn!(version_id = %handle.version_id, error = %e, "could not store report");
            return None;
        }
        match self.db.runs().set_report_file(&handle.version_id, &key).await {
            Ok(_) => {
                debug!(version_id = %handle.version_id, key = %key, filename = %report.filename, "report stored");
                Some(key)
            }
            Err(e) => {
                warn!(version_id = %handle.version_id, error = %e, "could not record report file");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_name() {
        assert_eq!(document_name("ТЗ на систему.docx"), "ТЗ на систему");
        assert_eq!(document_name("spec.DOCX"), "spec");
        assert_eq!(document_name("notes.doc"), "notes.doc");
        assert_eq!(document_name(".docx"), "");
        assert_eq!(document_name("ТЗ"), "ТЗ");
    }
}
