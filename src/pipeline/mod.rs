//! Pipeline driver: takes an uploaded DOCX through conversion, LLM analysis,
//! annotation and persistence.

pub mod coordinator;
pub mod driver;

use thiserror::Error;

use crate::repository::DbError;
use crate::storage::StorageError;

pub use coordinator::{Coordinator, RunSettings};
pub use driver::{document_name, CheckRequest, CheckResult, Pipeline, PipelineServices};

/// Failures that terminate a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("error converting word file: {0}")]
    ConvertFailure(String),
    #[error("error in neural network file analysis: {0}")]
    LlmAnalyzeFailure(String),
    #[error("could not persist run: {0}")]
    PersistenceFailure(#[from] DbError),
    #[error("object storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("run cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Stable machine code, stored on the failed version.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConvertFailure(_) => "convert_failure",
            Self::LlmAnalyzeFailure(_) => "llm_analyze_failure",
            Self::PersistenceFailure(_) => "persistence_failure",
            Self::Storage(_) => "storage_failure",
            Self::Cancelled => "cancelled",
        }
    }

    /// HTTP status an API layer should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::ConvertFailure(_) => 400,
            _ => 500,
        }
    }
}

/// Steps of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Received,
    ConvertedHtml,
    ConvertedMd,
    Prompted,
    LlmDone,
    FindingsMaterialized,
    HtmlAnnotated,
    Persisted,
    ReportRendered,
    Done,
    Failed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::ConvertedHtml => "converted_html",
            Self::ConvertedMd => "converted_md",
            Self::Prompted => "prompted",
            Self::LlmDone => "llm_done",
            Self::FindingsMaterialized => "findings_materialized",
            Self::HtmlAnnotated => "html_annotated",
            Self::Persisted => "persisted",
            Self::ReportRendered => "report_rendered",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Progress reached once this step completes.
    pub fn progress(&self) -> Option<i32> {
        match self {
            Self::Received => Some(0),
            Self::ConvertedHtml => Some(10),
            Self::ConvertedMd => Some(20),
            Self::Prompted => Some(LLM_PROGRESS_START),
            Self::LlmDone => Some(LLM_PROGRESS_END),
            Self::FindingsMaterialized => Some(85),
            Self::HtmlAnnotated => Some(90),
            Self::Persisted | Self::ReportRendered | Self::Done => Some(100),
            Self::Failed => None,
        }
    }
}

const LLM_PROGRESS_START: i32 = 30;
const LLM_PROGRESS_END: i32 = 80;

/// Progress after `completed` of `total` LLM tasks.
pub fn llm_progress(completed: usize, total: usize) -> i32 {
    if total == 0 {
        return LLM_PROGRESS_END;
    }
    let span = (LLM_PROGRESS_END - LLM_PROGRESS_START) as usize;
    LLM_PROGRESS_START + (span * completed.min(total) / total) as i32
}

/// Events emitted while a run progresses.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// A step finished
    StepCompleted { state: PipelineState, progress: i32 },
    /// One LLM prompt finished
    LlmTaskFinished { index: usize, ok: bool },
    /// The run failed with the given code
    Failed { code: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_progress() {
        assert_eq!(llm_progress(0, 4), 30);
        assert_eq!(llm_progress(2, 4), 55);
        assert_eq!(llm_progress(4, 4), 80);
        assert_eq!(llm_progress(9, 4), 80);
        assert_eq!(llm_progress(0, 0), 80);
    }

    #[test]
    fn test_error_codes() {
        let convert = PipelineError::ConvertFailure("empty html".into());
        assert_eq!(convert.http_status(), 400);
        assert_eq!(convert.code(), "convert_failure");

        let llm = PipelineError::LlmAnalyzeFailure("no schema".into());
        assert_eq!(llm.http_status(), 500);
        assert_eq!(PipelineError::Cancelled.code(), "cancelled");
    }

    #[test]
    fn test_checkpoints_are_monotonic() {
        let steps = [
            PipelineState::Received,
            PipelineState::ConvertedHtml,
            PipelineState::ConvertedMd,
            PipelineState::Prompted,
            PipelineState::LlmDone,
            PipelineState::FindingsMaterialized,
            PipelineState::HtmlAnnotated,
            PipelineState::Persisted,
        ];
        let progress: Vec<i32> = steps.iter().filter_map(|s| s.progress()).collect();
        assert!(progress.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(progress.last(), Some(&100));
    }
}
