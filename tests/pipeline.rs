//! End-to-end pipeline runs against in-memory collaborators.

mod common;

use std::collections::HashSet;
use std::time::Duration;

use regex::Regex;
use tokio::sync::mpsc;

use common::*;
use tzcheck::models::{FeedbackKind, FeedbackUpdate, VersionStatus};
use tzcheck::pipeline::{CheckRequest, PipelineError, PipelineEvent};
use tzcheck::text::normalize;

fn request() -> CheckRequest {
    CheckRequest {
        file: b"PK\x03\x04 fake docx".to_vec(),
        filename: "ТЗ на систему.DOCX".into(),
        user_id: "user-1".into(),
    }
}

fn two_groups() -> (FakePromptBuilder, ScriptedLlm) {
    let builder = FakePromptBuilder::new(vec![prompt("1", "p-one"), prompt("2", "p-two")]);
    let llm = ScriptedLlm::default()
        .with("p-one", group_one_response())
        .with("p-two", group_two_response());
    (builder, llm)
}

/// Text between the first opening and the last closing span of `id`, tags removed.
fn wrapped_text(html: &str, id: &str) -> String {
    let open = format!(r#"<span error-id="{id}">"#);
    let start = html.find(&open).expect("wrap present");
    let last_open = html.rfind(&open).unwrap();
    let end = html[last_open..].find("</span>").unwrap() + last_open;
    let tags = Regex::new(r"<[^>]+>").unwrap();
    tags.replace_all(&html[start + open.len()..end], "").into_owned()
}

fn error_ids_in_order(html: &str) -> Vec<String> {
    let re = Regex::new(r#"error-id="(\d+)""#).unwrap();
    let mut seen = Vec::new();
    for cap in re.captures_iter(html) {
        let id = cap[1].to_string();
        if !seen.contains(&id) {
            seen.push(id);
        }
    }
    seen
}

#[tokio::test]
async fn test_full_run() {
    let (builder, llm) = two_groups();
    let h = harness(&html_with_ids(), builder, llm, FakeRenderer::default()).await;
    let (tx, mut rx) = mpsc::channel(64);

    let result = h.pipeline.check_tz(&request(), Some(tx)).await.unwrap();

    assert_eq!(result.invalid_instances.len(), 2);
    assert_eq!(result.missing_instances.len(), 1);

    // Numeric ids cover 0..n exactly.
    let ids: HashSet<i64> = result
        .invalid_instances
        .iter()
        .map(|f| f.numeric_id)
        .chain(result.missing_instances.iter().map(|f| f.numeric_id))
        .collect();
    assert_eq!(ids, HashSet::from([0, 1, 2]));
    assert_eq!(result.missing_instances[0].numeric_id, 2);

    // Every wrap contains its quote.
    for f in &result.invalid_instances {
        let inner = wrapped_text(&result.out_html, &f.html_id);
        assert!(
            normalize(&inner).contains(&normalize(&f.quote)),
            "{inner:?} does not contain {:?}",
            f.quote
        );
    }
    assert!(result.out_html.contains(
        r#"<span error-id="0">тест</span> <span error-id="0">множественных</span> <span error-id="0">span</span>"#
    ));

    // Order numbers follow the document, not the LLM numbering.
    let order: Vec<&str> = result
        .invalid_instances
        .iter()
        .map(|f| f.html_id.as_str())
        .collect();
    assert_eq!(order, vec!["1", "0"]);
    assert_eq!(error_ids_in_order(&result.out_html), vec!["1", "0"]);
    assert_eq!(result.invalid_instances[0].order_number, Some(0));

    // Missing findings are never wrapped.
    assert!(!result.out_html.contains(r#"error-id="2""#));

    // Cost and tokens are summed over the tasks.
    assert_eq!(result.tokens_total, Some(150));
    assert!((result.cost_total_rub.unwrap() - 2.0).abs() < 1e-9);

    let codes: Vec<&str> = result.errors.iter().map(|e| e.error_code.as_str()).collect();
    assert_eq!(codes, vec!["E1", "E2"]);

    let detail = h
        .db
        .runs()
        .get_version(&result.version_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(detail.version.status, VersionStatus::Completed);
    assert_eq!(detail.version.progress, 100);
    assert_eq!(detail.version.spec_name, "ТЗ на систему");
    assert_eq!(detail.version.number_of_errors, Some(3));
    assert_eq!(detail.version.css.as_deref(), Some("p { margin: 0; }"));
    assert_eq!(detail.invalid_instances.len(), 2);
    assert_eq!(detail.invalid_instances[0].finding.html_id, "1");
    assert_eq!(detail.missing_instances.len(), 1);

    // The upload and the report are both stored.
    let report_key = result.report_file_id.clone().unwrap();
    assert_eq!(detail.version.report_file_id.as_deref(), Some(report_key.as_str()));
    let objects = h.store.objects.lock().unwrap();
    assert_eq!(objects.get(&report_key).unwrap(), b"PK-docx");
    let original = detail.version.original_file_id.clone().unwrap();
    assert!(original.starts_with("docx/"));
    assert!(objects.contains_key(&original));
    drop(objects);

    let payload = h.renderer.payload.lock().unwrap().clone();
    assert_eq!(payload.len(), 2);
    assert_eq!(payload[0].error_code, "E1");
    assert_eq!(payload[0].order_number, 0);
    assert_eq!(payload[1].name.as_deref(), Some("Группа 1"));
    assert_eq!(payload[1].missing_instances.len(), 1);

    let mut progress = Vec::new();
    let mut llm_tasks = 0;
    while let Some(event) = rx.recv().await {
        match event {
            PipelineEvent::StepCompleted { progress: p, .. } => progress.push(p),
            PipelineEvent::LlmTaskFinished { ok, .. } => {
                assert!(ok);
                llm_tasks += 1;
            }
            PipelineEvent::Failed { code } => panic!("unexpected failure {code}"),
        }
    }
    assert_eq!(llm_tasks, 2);
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(progress.last(), Some(&100));
}

#[tokio::test]
async fn test_missing_only_leaves_html_untouched() {
    let builder = FakePromptBuilder::new(vec![prompt("1", "p-one")]);
    let llm = ScriptedLlm::default().with(
        "p-one",
        response(serde_json::json!({
            "result": {"group_id": "1", "errors": [{
                "code": "E5",
                "instances": [{"err_type": "missing", "suggested_fix": "добавить"}]
            }]}
        })),
    );
    let h = harness(&html_with_ids(), builder, llm, FakeRenderer::default()).await;

    let result = h.pipeline.check_tz(&request(), None).await.unwrap();

    assert_eq!(result.out_html, html_with_ids());
    assert!(result.invalid_instances.is_empty());
    assert_eq!(result.missing_instances.len(), 1);
    assert_eq!(result.missing_instances[0].numeric_id, 0);
    assert_eq!(result.tokens_total, None);

    let detail = h.db.runs().get_version(&result.version_id).await.unwrap().unwrap();
    assert_eq!(detail.version.number_of_errors, Some(1));
    assert!(detail.invalid_instances.is_empty());
    assert_eq!(detail.missing_instances.len(), 1);
}

#[tokio::test]
async fn test_partial_llm_failure_continues() {
    let builder = FakePromptBuilder::new(vec![
        prompt("1", "p-one"),
        prompt("2", "p-two"),
        prompt("3", "p-broken"),
    ]);
    let llm = ScriptedLlm::default().with("p-one", group_one_response());
    let h = harness(&html_with_ids(), builder, llm, FakeRenderer::default()).await;

    let result = h.pipeline.check_tz(&request(), None).await.unwrap();

    assert_eq!(result.tokens_total, Some(100));
    assert_eq!(result.cost_total_rub, Some(1.5));
    assert_eq!(result.invalid_instances.len(), 1);
    assert_eq!(result.errors.len(), 1);
}

#[tokio::test]
async fn test_no_prompts_completes_clean() {
    let builder = FakePromptBuilder::new(vec![]);
    let h = harness(&html_with_ids(), builder, ScriptedLlm::default(), FakeRenderer::default()).await;

    let result = h.pipeline.check_tz(&request(), None).await.unwrap();

    assert!(result.errors.is_empty());
    assert!(result.invalid_instances.is_empty());
    assert!(result.missing_instances.is_empty());
    assert_eq!(result.out_html, html_with_ids());
    assert_eq!(result.tokens_total, None);

    let detail = h.db.runs().get_version(&result.version_id).await.unwrap().unwrap();
    assert_eq!(detail.version.status, VersionStatus::Completed);
    assert_eq!(detail.version.number_of_errors, Some(0));
}

#[tokio::test]
async fn test_several_findings_persist_row_by_row() {
    let builder = FakePromptBuilder::new(vec![prompt("1", "p-one")]);
    let llm = ScriptedLlm::default().with(
        "p-one",
        response(serde_json::json!({
            "result": {"group_id": "1", "errors": [
                {"code": "E7", "instances": [
                    {"err_type": "missing", "suggested_fix": "добавить раздел"},
                    {"err_type": "missing"}
                ]},
                {"code": "E8", "instances": [{"err_type": "missing", "rationale": "срыв сроков"}]}
            ]}
        })),
    );
    let h = harness(&html_with_ids(), builder, llm, FakeRenderer::default()).await;

    let result = h.pipeline.check_tz(&request(), None).await.unwrap();
    assert_eq!(result.missing_instances.len(), 3);

    let detail = h.db.runs().get_version(&result.version_id).await.unwrap().unwrap();
    assert_eq!(detail.errors.len(), 2);
    assert_eq!(detail.missing_instances.len(), 3);
    assert_eq!(detail.version.number_of_errors, Some(3));
}

#[tokio::test]
async fn test_all_llm_tasks_failing_marks_version_failed() {
    let builder = FakePromptBuilder::new(vec![prompt("1", "p-one"), prompt("2", "p-two")]);
    let h = harness(&html_with_ids(), builder, ScriptedLlm::default(), FakeRenderer::default()).await;
    let (tx, mut rx) = mpsc::channel(64);

    let err = h.pipeline.check_tz(&request(), Some(tx)).await.unwrap_err();
    assert!(matches!(err, PipelineError::LlmAnalyzeFailure(_)));
    assert_eq!(err.http_status(), 500);

    let mut failed_code = None;
    while let Some(event) = rx.recv().await {
        if let PipelineEvent::Failed { code } = event {
            failed_code = Some(code);
        }
    }
    assert_eq!(failed_code, Some("llm_analyze_failure"));

    // Nothing of the run is visible apart from the failed version.
    let rows = h.db.analytics().admin_dashboard(None).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, "failed");
    let detail = h.db.runs().get_version(&rows[0].version_id).await.unwrap().unwrap();
    assert_eq!(detail.version.failure_code.as_deref(), Some("llm_analyze_failure"));
    assert!(detail.errors.is_empty());
    assert!(detail.invalid_instances.is_empty());
    assert!(detail.missing_instances.is_empty());
}

#[tokio::test]
async fn test_empty_html_is_conversion_failure() {
    let (builder, llm) = two_groups();
    let h = harness("   ", builder, llm, FakeRenderer::default()).await;

    let err = h.pipeline.check_tz(&request(), None).await.unwrap_err();
    assert!(matches!(err, PipelineError::ConvertFailure(_)));
    assert_eq!(err.http_status(), 400);

    let rows = h.db.analytics().admin_dashboard(None).await.unwrap();
    assert_eq!(rows[0].status, "failed");
    assert!(h.prompt_builder.seen_gg_id.lock().unwrap().is_none());
}

#[tokio::test]
async fn test_missing_schema_is_analysis_failure() {
    let (mut builder, llm) = two_groups();
    builder.schema = Some(serde_json::Value::Null);
    let h = harness(&html_with_ids(), builder, llm, FakeRenderer::default()).await;

    let err = h.pipeline.check_tz(&request(), None).await.unwrap_err();
    assert_eq!(err.code(), "llm_analyze_failure");
}

#[tokio::test]
async fn test_cancel_before_persist() {
    let (builder, mut llm) = two_groups();
    llm.delay = Some(Duration::from_secs(30));
    let h = harness(&html_with_ids(), builder, llm, FakeRenderer::default()).await;

    let err = h
        .pipeline
        .check_tz_until(&request(), None, tokio::time::sleep(Duration::from_millis(50)))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled));

    let rows = h.db.analytics().admin_dashboard(None).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_ne!(rows[0].status, "completed");
    let detail = h.db.runs().get_version(&rows[0].version_id).await.unwrap().unwrap();
    assert!(detail.errors.is_empty());
}

#[tokio::test]
async fn test_run_uses_settings_snapshot() {
    let (builder, llm) = two_groups();
    let h = harness(&html_with_ids(), builder, llm, FakeRenderer::default()).await;
    h.pipeline.coordinator().set_gg_id(5);

    h.pipeline.check_tz(&request(), None).await.unwrap();
    assert_eq!(*h.prompt_builder.seen_gg_id.lock().unwrap(), Some(5));
}

#[tokio::test]
async fn test_report_failure_does_not_fail_run() {
    let (builder, llm) = two_groups();
    let renderer = FakeRenderer {
        fail: true,
        ..Default::default()
    };
    let h = harness(&html_with_ids(), builder, llm, renderer).await;

    let result = h.pipeline.check_tz(&request(), None).await.unwrap();
    assert!(result.report_file_id.is_none());

    let detail = h.db.runs().get_version(&result.version_id).await.unwrap().unwrap();
    assert_eq!(detail.version.status, VersionStatus::Completed);
    assert!(detail.version.report_file_id.is_none());
}

#[tokio::test]
async fn test_second_run_is_next_version() {
    let (builder, llm) = two_groups();
    let h = harness(&html_with_ids(), builder, llm, FakeRenderer::default()).await;

    let first = h.pipeline.check_tz(&request(), None).await.unwrap();
    let second = h.pipeline.check_tz(&request(), None).await.unwrap();
    assert_eq!(first.version_number, 1);
    assert_eq!(second.version_number, 2);

    // Numeric ids restart per version.
    let resolved = h
        .db
        .feedback()
        .uuid_by_numeric_id(0, Some(&second.version_id))
        .await
        .unwrap()
        .unwrap();
    let expected = second
        .invalid_instances
        .iter()
        .find(|f| f.numeric_id == 0)
        .map(|f| f.id.clone())
        .unwrap();
    assert_eq!(resolved, expected);

}

#[tokio::test]
async fn test_service_facade_feedback_flow() {
    let (builder, llm) = two_groups();
    let (service, _dir) = harness(&html_with_ids(), builder, llm, FakeRenderer::default())
        .await
        .into_service();

    let result = service
        .check_tz(b"PK".to_vec(), "ТЗ.docx", "user-1", None)
        .await
        .unwrap();
    let detail = service.get_version(&result.version_id).await.unwrap().unwrap();
    assert_eq!(detail.version.status, VersionStatus::Completed);

    let mut update = FeedbackUpdate {
        instance_id: result.invalid_instances[0].id.clone(),
        kind: FeedbackKind::Invalid,
        mark: Some(false),
        comment: None,
        user_id: "reviewer".into(),
        is_verification: false,
    };
    assert!(service.new_feedback_error(&update).await.is_err());

    update.comment = Some("  не ошибка  ".into());
    service.new_feedback_error(&update).await.unwrap();

    let entries = service.feedbacks(Some("reviewer")).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].comment.as_deref(), Some("не ошибка"));
    assert_eq!(entries[0].mark, Some(false));
    assert_eq!(entries[0].spec_name, "ТЗ");
}
