//! Concurrent execution of a prompt set.
//!
//! One task is spawned per prompt and completions arrive over a channel in
//! whatever order the LLM answers. A failed task or an empty result is logged
//! and skipped. Dropping the returned future aborts every task still running.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::client::LlmError;
use super::report::{GroupReport, LlmResponse, PromptItem};
use super::LlmBackend;

/// A group report with the index of the prompt that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedReport {
    pub index: usize,
    pub report: GroupReport,
}

/// Aggregated result of a fan-out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FanoutOutcome {
    /// Reports sorted by prompt index.
    pub reports: Vec<IndexedReport>,
    /// Sum of reported costs; `None` when no task reported one.
    pub cost_total_rub: Option<f64>,
    /// Sum of reported token usage; `None` when no task reported one.
    pub tokens_total: Option<i64>,
    pub succeeded: usize,
    pub failed: usize,
}

impl FanoutOutcome {
    fn absorb(&mut self, index: usize, result: Result<LlmResponse, LlmError>) -> bool {
        let resp = match result {
            Ok(resp) => resp,
            Err(e) => {
                warn!(prompt = index, error = %e, "LLM task failed");
                return false;
            }
        };

        let (cost, tokens) = (resp.cost_rub(), resp.tokens());
        match resp.result {
            Some(report) => {
                // only tasks that produced a report count towards the totals
                if let Some(cost) = cost {
                    self.cost_total_rub = Some(self.cost_total_rub.unwrap_or(0.0) + cost);
                }
                if let Some(tokens) = tokens {
                    self.tokens_total = Some(self.tokens_total.unwrap_or(0) + tokens);
                }
                self.reports.push(IndexedReport { index, report });
                true
            }
            None => {
                warn!(prompt = index, "LLM task returned no result");
                false
            }
        }
    }
}

/// Notification sent after each task completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskFinished {
    pub index: usize,
    pub ok: bool,
    pub completed: usize,
    pub total: usize,
}

/// Receives task completions while a fan-out runs.
#[async_trait]
pub trait FanoutObserver: Send + Sync {
    async fn task_finished(&self, finished: TaskFinished);
}

#[async_trait]
impl FanoutObserver for () {
    async fn task_finished(&self, _finished: TaskFinished) {}
}

/// Aborts the spawned tasks when dropped.
struct AbortOnDrop(Vec<JoinHandle<()>>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// Run every prompt against `backend` concurrently.
pub async fn run_prompts(
    backend: Arc<dyn LlmBackend>,
    prompts: &[PromptItem],
    schema: &serde_json::Value,
    use_cache: bool,
    observer: &dyn FanoutObserver,
) -> FanoutOutcome {
    let total = prompts.len();
    let mut outcome = FanoutOutcome::default();
    if total == 0 {
        return outcome;
    }

    let (tx, mut rx) = mpsc::channel::<(usize, Result<LlmResponse, LlmError>)>(total);
    let schema = Arc::new(schema.clone());
    let mut tasks = AbortOnDrop(Vec::with_capacity(total));

    for (index, prompt) in prompts.iter().enumerate() {
        let backend = backend.clone();
        let schema = schema.clone();
        let messages = prompt.messages.clone();
        let tx = tx.clone();
        tasks.0.push(tokio::spawn(async move {
            let result = backend.send(&messages, &schema, use_cache).await;
            let _ = tx.send((index, result)).await;
        }));
    }
    drop(tx);
    debug!(tasks = total, use_cache, "LLM fan-out started");

    let mut completed = 0;
    while let Some((index, result)) = rx.recv().await {
        completed += 1;
        let ok = outcome.absorb(index, result);
        observer
            .task_finished(TaskFinished {
                index,
                ok,
                completed,
                total,
            })
            .await;
    }
    drop(tasks);

    outcome.reports.sort_by_key(|r| r.index);
    outcome.succeeded = outcome.reports.len();
    outcome.failed = total - outcome.succeeded;
    info!(
        succeeded = outcome.succeeded,
        failed = outcome.failed,
        tokens = ?outcome.tokens_total,
        cost_rub = ?outcome.cost_total_rub,
        "LLM fan-out finished"
    );
    outcome
}
