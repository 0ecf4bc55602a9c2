//! Specifications, versions and the findings a run persists.
//!
//! A run touches the database twice: [`RunRepository::begin_run`] creates the
//! `in_progress` version that progress polling observes, and
//! [`RunRepository::save_run`] writes the outcome with all errors and
//! instances in one transaction. Nothing a run produces is visible before
//! that transaction commits.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncConnection, RunQueryDsl};
use tracing::{debug, info};
use uuid::Uuid;

use super::models::{
    ErrorRecord, InvalidInstanceRecord, MissingInstanceRecord, NewError, NewInvalidInstance,
    NewMissingInstance, NewSpecification, NewVersion, SpecificationRecord, VersionRecord,
};
use super::pool::{DbError, SqliteConn, SqlitePool};
use super::util::{from_json_list, parse_datetime, to_json_text};
use crate::models::{
    ErrorGroup, InstanceFeedback, InvalidFinding, MissingFinding, Stored, Version, VersionDetail,
    VersionStatus,
};
use crate::schema::{errors, invalid_instances, missing_instances, technical_specifications, versions};

/// Identifies the version a run writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunHandle {
    pub spec_id: String,
    pub version_id: String,
    pub version_number: i64,
}

/// Everything a finished run stores.
#[derive(Debug, Clone)]
pub struct CompletedRun<'a> {
    /// Version created by `begin_run`, if any.
    pub version_id: Option<&'a str>,
    /// Specification name (the filename without `.docx`).
    pub name: &'a str,
    pub user_id: &'a str,
    pub out_html: &'a str,
    pub css: &'a str,
    pub original_file_id: Option<&'a str>,
    pub original_file_size: Option<i64>,
    /// Error groups in report order.
    pub errors: &'a [ErrorGroup],
    pub invalid: &'a [InvalidFinding],
    pub missing: &'a [MissingFinding],
    pub cost_total_rub: Option<f64>,
    pub tokens_total: Option<i64>,
    pub inspection_duration: Duration,
    pub llm_report: Option<&'a serde_json::Value>,
}

#[derive(Clone)]
pub struct RunRepository {
    pool: SqlitePool,
}

impl RunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the specification if needed and a fresh `in_progress` version.
    pub async fn begin_run(
        &self,
        name: &str,
        user_id: &str,
        original_file_id: Option<&str>,
        original_file_size: Option<i64>,
    ) -> Result<RunHandle, DbError> {
        let mut conn = self.pool.get().await?;
        let now = Utc::now().to_rfc3339();

        let handle = conn
            .transaction(|conn| {
                Box::pin(async move {
                    let spec_id = lock_specification(conn, name, user_id, &now).await?;
                    create_version(conn, &spec_id, &now, original_file_id, original_file_size)
                        .await
                })
            })
            .await?;

        info!(
            version_id = %handle.version_id,
            version_number = handle.version_number,
            name,
            "run started"
        );
        Ok(handle)
    }

    /// Store a finished run atomically.
    ///
    /// Without a `version_id` the newest in-progress version of the
    /// specification is reused, or a new one is created.
    pub async fn save_run(&self, run: &CompletedRun<'_>) -> Result<RunHandle, DbError> {
        let mut conn = self.pool.get().await?;
        let now = Utc::now().to_rfc3339();

        let handle = conn
            .transaction(|conn| {
                Box::pin(async move {
                    let spec_id = lock_specification(conn, run.name, run.user_id, &now).await?;
                    let handle = match run.version_id {
                        Some(id) => {
                            let number: i64 = versions::table
                                .find(id)
                                .filter(versions::technical_specification_id.eq(&spec_id))
                                .select(versions::version_number)
                                .first(conn)
                                .await?;
                            RunHandle {
                                spec_id: spec_id.clone(),
                                version_id: id.to_string(),
                                version_number: number,
                            }
                        }
                        None => {
                            let reusable: Option<(String, i64)> = versions::table
                                .filter(versions::technical_specification_id.eq(&spec_id))
                                .filter(versions::status.eq(VersionStatus::InProgress.as_str()))
                                .order(versions::version_number.desc())
                                .select((versions::id, versions::version_number))
                                .first(conn)
                                .await
                                .optional()?;
                            match reusable {
                                Some((version_id, version_number)) => RunHandle {
                                    spec_id: spec_id.clone(),
                                    version_id,
                                    version_number,
                                },
                                None => {
                                    create_version(
                                        conn,
                                        &spec_id,
                                        &now,
                                        run.original_file_id,
                                        run.original_file_size,
                                    )
                                    .await?
                                }
                            }
                        }
                    };

                    write_outcome(conn, &handle.version_id, run, &now).await?;
                    Ok::<_, DbError>(handle)
                })
            })
            .await?;

        info!(
            version_id = %handle.version_id,
            errors = run.errors.len(),
            invalid = run.invalid.len(),
            missing = run.missing.len(),
            "run persisted"
        );
        Ok(handle)
    }

    /// Raise a running version's progress. Returns false when nothing changed.
    pub async fn update_progress(&self, version_id: &str, progress: i32) -> Result<bool, DbError> {
        let mut conn = self.pool.get().await?;
        let now = Utc::now().to_rfc3339();

        let rows = diesel::update(
            versions::table
                .find(version_id)
                .filter(versions::status.eq(VersionStatus::InProgress.as_str()))
                .filter(versions::progress.lt(progress)),
        )
        .set((versions::progress.eq(progress), versions::updated_at.eq(&now)))
        .execute(&mut conn)
        .await?;

        Ok(rows > 0)
    }

    /// Mark a running version as failed with a diagnostic.
    pub async fn mark_failed(
        &self,
        version_id: &str,
        code: &str,
        message: &str,
    ) -> Result<bool, DbError> {
        let mut conn = self.pool.get().await?;
        let now = Utc::now().to_rfc3339();

        let rows = diesel::update(
            versions::table
                .find(version_id)
                .filter(versions::status.eq(VersionStatus::InProgress.as_str())),
        )
        .set((
            versions::status.eq(VersionStatus::Failed.as_str()),
            versions::failure_code.eq(code),
            versions::failure_message.eq(message),
            versions::updated_at.eq(&now),
        ))
        .execute(&mut conn)
        .await?;

        Ok(rows > 0)
    }

    pub async fn set_report_file(&self, version_id: &str, key: &str) -> Result<bool, DbError> {
        let mut conn = self.pool.get().await?;
        let now = Utc::now().to_rfc3339();

        let rows = diesel::update(versions::table.find(version_id))
            .set((
                versions::report_file_id.eq(key),
                versions::updated_at.eq(&now),
            ))
            .execute(&mut conn)
            .await?;

        Ok(rows > 0)
    }

    /// Load a version with its errors and instances.
    pub async fn get_version(&self, version_id: &str) -> Result<Option<VersionDetail>, DbError> {
        let mut conn = self.pool.get().await?;

        let row: Option<(VersionRecord, SpecificationRecord)> = versions::table
            .inner_join(technical_specifications::table)
            .filter(versions::id.eq(version_id))
            .select((VersionRecord::as_select(), SpecificationRecord::as_select()))
            .first(&mut conn)
            .await
            .optional()?;
        let Some((version, spec)) = row else {
            return Ok(None);
        };

        let error_rows: Vec<ErrorRecord> = errors::table
            .filter(errors::version_id.eq(version_id))
            .order(errors::order_number.asc())
            .load(&mut conn)
            .await?;
        let invalid_rows: Vec<InvalidInstanceRecord> = invalid_instances::table
            .filter(invalid_instances::version_id.eq(version_id))
            .order((
                invalid_instances::order_number.asc(),
                invalid_instances::numeric_id.asc(),
            ))
            .load(&mut conn)
            .await?;
        let missing_rows: Vec<MissingInstanceRecord> = missing_instances::table
            .filter(missing_instances::version_id.eq(version_id))
            .order(missing_instances::numeric_id.asc())
            .load(&mut conn)
            .await?;

        let codes: HashMap<&str, (&str, &str)> = error_rows
            .iter()
            .map(|e| (e.id.as_str(), (e.group_id.as_str(), e.error_code.as_str())))
            .collect();
        let invalid_instances = invalid_rows
            .into_iter()
            .map(|r| {
                let (group_id, code) = codes.get(r.error_id.as_str()).copied().unwrap_or_default();
                stored_invalid(r, group_id, code)
            })
            .collect();
        let missing_instances = missing_rows
            .into_iter()
            .map(|r| {
                let (group_id, code) = codes.get(r.error_id.as_str()).copied().unwrap_or_default();
                stored_missing(r, group_id, code)
            })
            .collect();

        Ok(Some(VersionDetail {
            version: to_version(version, spec),
            errors: error_rows.into_iter().map(to_error_group).collect(),
            invalid_instances,
            missing_instances,
        }))
    }

    /// The highest-numbered version of a specification.
    pub async fn get_latest_version(&self, spec_id: &str) -> Result<Option<Version>, DbError> {
        let mut conn = self.pool.get().await?;

        let row: Option<(VersionRecord, SpecificationRecord)> = versions::table
            .inner_join(technical_specifications::table)
            .filter(versions::technical_specification_id.eq(spec_id))
            .order(versions::version_number.desc())
            .select((VersionRecord::as_select(), SpecificationRecord::as_select()))
            .first(&mut conn)
            .await
            .optional()?;

        Ok(row.map(|(v, s)| to_version(v, s)))
    }

    /// Delete a specification with all its versions, errors and instances.
    pub async fn delete_specification(&self, spec_id: &str) -> Result<bool, DbError> {
        let mut conn = self.pool.get().await?;

        let rows = diesel::delete(technical_specifications::table.find(spec_id))
            .execute(&mut conn)
            .await?;
        debug!(spec_id, deleted = rows > 0, "specification delete");
        Ok(rows > 0)
    }
}

/// Find or create the specification row, writing to it first.
///
/// The upsert is the transaction's first statement, so the transaction holds
/// SQLite's write lock before it reads version numbers.
async fn lock_specification(
    conn: &mut SqliteConn,
    name: &str,
    user_id: &str,
    now: &str,
) -> Result<String, DbError> {
    let candidate = Uuid::new_v4().to_string();
    diesel::insert_into(technical_specifications::table)
        .values(&NewSpecification {
            id: &candidate,
            name,
            user_id,
            created_at: now,
            updated_at: now,
        })
        .on_conflict((
            technical_specifications::user_id,
            technical_specifications::name,
        ))
        .do_update()
        .set(technical_specifications::updated_at.eq(now))
        .execute(conn)
        .await?;

    technical_specifications::table
        .filter(technical_specifications::user_id.eq(user_id))
        .filter(technical_specifications::name.eq(name))
        .select(technical_specifications::id)
        .first(conn)
        .await
}

async fn create_version(
    conn: &mut SqliteConn,
    spec_id: &str,
    now: &str,
    original_file_id: Option<&str>,
    original_file_size: Option<i64>,
) -> Result<RunHandle, DbError> {
    let max: Option<i64> = versions::table
        .filter(versions::technical_specification_id.eq(spec_id))
        .select(diesel::dsl::max(versions::version_number))
        .first(conn)
        .await?;
    let version_number = max.unwrap_or(0) + 1;
    let version_id = Uuid::new_v4().to_string();

    diesel::insert_into(versions::table)
        .values(&NewVersion {
            id: &version_id,
            technical_specification_id: spec_id,
            version_number,
            created_at: now,
            updated_at: now,
            status: VersionStatus::InProgress.as_str(),
            progress: 0,
            original_file_id,
            original_file_size,
        })
        .execute(conn)
        .await?;

    Ok(RunHandle {
        spec_id: spec_id.to_string(),
        version_id,
        version_number,
    })
}

async fn write_outcome(
    conn: &mut SqliteConn,
    version_id: &str,
    run: &CompletedRun<'_>,
    now: &str,
) -> Result<(), DbError> {
    let llm_report = run.llm_report.map(|v| v.to_string());
    let duration_ms = i64::try_from(run.inspection_duration.as_millis()).unwrap_or(i64::MAX);
    let number_of_errors = (run.invalid.len() + run.missing.len()) as i64;

    diesel::update(versions::table.find(version_id))
        .set((
            versions::status.eq(VersionStatus::Completed.as_str()),
            versions::progress.eq(100),
            versions::out_html.eq(run.out_html),
            versions::css.eq(run.css),
            versions::tokens_total.eq(run.tokens_total),
            versions::cost_total_rub.eq(run.cost_total_rub),
            versions::inspection_duration_ms.eq(duration_ms),
            versions::number_of_errors.eq(number_of_errors),
            versions::llm_report.eq(llm_report),
            versions::updated_at.eq(now),
        ))
        .execute(conn)
        .await?;

    if run.original_file_id.is_some() {
        diesel::update(versions::table.find(version_id))
            .set((
                versions::original_file_id.eq(run.original_file_id),
                versions::original_file_size.eq(run.original_file_size),
            ))
            .execute(conn)
            .await?;
    }

    // Instances go with their errors through the foreign key cascade.
    diesel::delete(errors::table.filter(errors::version_id.eq(version_id)))
        .execute(conn)
        .await?;

    let new_errors: Vec<NewError<'_>> = run
        .errors
        .iter()
        .enumerate()
        .map(|(n, e)| NewError {
            id: &e.id,
            version_id,
            group_id: &e.group_id,
            error_code: &e.error_code,
            order_number: n as i64,
            verdict: e.verdict.as_deref(),
            preliminary_notes: e.preliminary_notes.as_deref(),
            overall_critique: e.overall_critique.as_deref(),
            process_analysis: e.process_analysis.as_deref(),
            process_critique: e.process_critique.as_deref(),
            process_verification: e.process_verification.as_deref(),
            process_retrieval: to_json_text(&e.process_retrieval),
            instances: e.instances.to_string(),
            created_at: now,
        })
        .collect();
    for row in &new_errors {
        diesel::insert_into(errors::table)
            .values(row)
            .execute(conn)
            .await?;
    }

    let new_invalid: Vec<NewInvalidInstance<'_>> = run
        .invalid
        .iter()
        .map(|f| NewInvalidInstance {
            id: &f.id,
            error_id: &f.error_id,
            version_id,
            numeric_id: f.numeric_id,
            html_id: &f.html_id,
            quote: &f.quote,
            original_quote: &f.original_quote,
            quote_lines: f.quote_lines.as_ref().map(to_json_text),
            analysis: f.analysis.as_deref(),
            critique: f.critique.as_deref(),
            verification: f.verification.as_deref(),
            suggested_fix: f.suggested_fix.as_deref(),
            rationale: f.rationale.as_deref(),
            until_end_of_sentence: f.until_end_of_sentence,
            start_line: f.start_line,
            end_line: f.end_line,
            order_number: f.order_number,
            created_at: now,
        })
        .collect();
    for row in &new_invalid {
        diesel::insert_into(invalid_instances::table)
            .values(row)
            .execute(conn)
            .await?;
    }

    let new_missing: Vec<NewMissingInstance<'_>> = run
        .missing
        .iter()
        .map(|f| NewMissingInstance {
            id: &f.id,
            error_id: &f.error_id,
            version_id,
            numeric_id: f.numeric_id,
            html_id: &f.html_id,
            analysis: f.analysis.as_deref(),
            critique: f.critique.as_deref(),
            verification: f.verification.as_deref(),
            suggested_fix: f.suggested_fix.as_deref(),
            rationale: f.rationale.as_deref(),
            retrieval: to_json_text(&f.retrieval),
            created_at: now,
        })
        .collect();
    for row in &new_missing {
        diesel::insert_into(missing_instances::table)
            .values(row)
            .execute(conn)
            .await?;
    }

    Ok(())
}

pub(crate) fn to_version(v: VersionRecord, spec: SpecificationRecord) -> Version {
    Version {
        status: VersionStatus::from_str(&v.status).unwrap_or(VersionStatus::Failed),
        created_at: parse_datetime(&v.created_at),
        updated_at: parse_datetime(&v.updated_at),
        llm_report: v.llm_report.and_then(|s| serde_json::from_str(&s).ok()),
        id: v.id,
        spec_id: spec.id,
        spec_name: spec.name,
        user_id: spec.user_id,
        version_number: v.version_number,
        progress: v.progress,
        original_file_id: v.original_file_id,
        original_file_size: v.original_file_size,
        out_html: v.out_html,
        css: v.css,
        report_file_id: v.report_file_id,
        tokens_total: v.tokens_total,
        cost_total_rub: v.cost_total_rub,
        inspection_duration_ms: v.inspection_duration_ms,
        number_of_errors: v.number_of_errors,
        failure_code: v.failure_code,
        failure_message: v.failure_message,
    }
}

fn to_error_group(e: ErrorRecord) -> ErrorGroup {
    ErrorGroup {
        process_retrieval: from_json_list(&e.process_retrieval),
        instances: serde_json::from_str(&e.instances).unwrap_or_default(),
        id: e.id,
        group_id: e.group_id,
        error_code: e.error_code,
        verdict: e.verdict,
        preliminary_notes: e.preliminary_notes,
        overall_critique: e.overall_critique,
        process_analysis: e.process_analysis,
        process_critique: e.process_critique,
        process_verification: e.process_verification,
    }
}

fn feedback(
    exists: bool,
    mark: Option<bool>,
    comment: Option<String>,
    user_id: Option<String>,
) -> Option<InstanceFeedback> {
    exists.then_some(InstanceFeedback {
        mark,
        comment,
        user_id,
    })
}

fn stored_invalid(r: InvalidInstanceRecord, group_id: &str, code: &str) -> Stored<InvalidFinding> {
    Stored {
        feedback: feedback(r.feedback_exists, r.feedback_mark, r.feedback_comment, r.feedback_user),
        verification_feedback: feedback(
            r.verification_feedback_exists,
            r.verification_feedback_mark,
            r.verification_feedback_comment,
            r.verification_feedback_user,
        ),
        finding: InvalidFinding {
            quote_lines: r.quote_lines.as_deref().map(from_json_list),
            id: r.id,
            error_id: r.error_id,
            numeric_id: r.numeric_id,
            html_id: r.html_id,
            group_id: group_id.to_string(),
            error_code: code.to_string(),
            quote: r.quote,
            original_quote: r.original_quote,
            analysis: r.analysis,
            critique: r.critique,
            verification: r.verification,
            suggested_fix: r.suggested_fix,
            rationale: r.rationale,
            until_end_of_sentence: r.until_end_of_sentence,
            start_line: r.start_line,
            end_line: r.end_line,
            order_number: r.order_number,
        },
    }
}

fn stored_missing(r: MissingInstanceRecord, group_id: &str, code: &str) -> Stored<MissingFinding> {
    Stored {
        feedback: feedback(r.feedback_exists, r.feedback_mark, r.feedback_comment, r.feedback_user),
        verification_feedback: feedback(
            r.verification_feedback_exists,
            r.verification_feedback_mark,
            r.verification_feedback_comment,
            r.verification_feedback_user,
        ),
        finding: MissingFinding {
            retrieval: from_json_list(&r.retrieval),
            id: r.id,
            error_id: r.error_id,
            numeric_id: r.numeric_id,
            html_id: r.html_id,
            group_id: group_id.to_string(),
            error_code: code.to_string(),
            analysis: r.analysis,
            critique: r.critique,
            verification: r.verification,
            suggested_fix: r.suggested_fix,
            rationale: r.rationale,
        },
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn error_group(id: &str, group_id: &str, code: &str) -> ErrorGroup {
        ErrorGroup {
            id: id.into(),
            group_id: group_id.into(),
            error_code: code.into(),
            verdict: Some("error".into()),
            preliminary_notes: None,
            overall_critique: None,
            process_analysis: Some("анализ".into()),
            process_critique: None,
            process_verification: None,
            process_retrieval: vec!["раздел 4".into()],
            instances: serde_json::json!([{"err_type": "invalid", "snippet": "текст"}]),
        }
    }

    pub fn invalid(id: &str, error_id: &str, numeric_id: i64, order_number: i64) -> InvalidFinding {
        InvalidFinding {
            id: id.into(),
            error_id: error_id.into(),
            numeric_id,
            html_id: numeric_id.to_string(),
            group_id: String::new(),
            error_code: String::new(),
            quote: "текст".into(),
            original_quote: "**текст**".into(),
            quote_lines: None,
            analysis: None,
            critique: None,
            verification: None,
            suggested_fix: Some("заменить".into()),
            rationale: None,
            until_end_of_sentence: false,
            start_line: Some(3),
            end_line: Some(3),
            order_number: Some(order_number),
        }
    }

    pub fn missing(id: &str, error_id: &str, numeric_id: i64) -> MissingFinding {
        MissingFinding {
            id: id.into(),
            error_id: error_id.into(),
            numeric_id,
            html_id: numeric_id.to_string(),
            group_id: String::new(),
            error_code: String::new(),
            analysis: None,
            critique: None,
            verification: None,
            suggested_fix: Some("добавить раздел".into()),
            rationale: None,
            retrieval: vec!["ГОСТ 34.602".into()],
        }
    }

    pub fn completed<'a>(
        version_id: Option<&'a str>,
        errors: &'a [ErrorGroup],
        invalid: &'a [InvalidFinding],
        missing: &'a [MissingFinding],
    ) -> CompletedRun<'a> {
        CompletedRun {
            version_id,
            name: "ТЗ на систему",
            user_id: "user-1",
            out_html: "<p><span error-id=\"0\">текст</span></p>",
            css: "p{}",
            original_file_id: Some("docx/a.docx"),
            original_file_size: Some(1024),
            errors,
            invalid,
            missing,
            cost_total_rub: Some(2.5),
            tokens_total: Some(300),
            inspection_duration: Duration::from_millis(1500),
            llm_report: None,
        }
    }
}
