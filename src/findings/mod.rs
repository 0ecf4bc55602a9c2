//! Flattening group reports into error groups and findings.

mod codes;

use std::collections::HashMap;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::llm::report::{ErrType, ErrorReport, Instance, PromptItem};
use crate::llm::IndexedReport;
use crate::models::{ErrorGroup, Finding, InvalidFinding, MissingFinding};
use crate::text::{clean_quote, ends_with_ellipsis, quote_lines};

pub use codes::{compare_codes, sort_by_code};

/// Output of [`assemble`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assembly {
    pub errors: Vec<ErrorGroup>,
    /// Numbered `0..k`.
    pub invalid: Vec<InvalidFinding>,
    /// Numbered `k..n`, after the invalid findings.
    pub missing: Vec<MissingFinding>,
}

impl Assembly {
    /// Total number of findings.
    pub fn number_of_errors(&self) -> usize {
        self.invalid.len() + self.missing.len()
    }
}

/// Flatten reports (already sorted by prompt index) into numbered findings.
///
/// A report without a group id falls back to its prompt's group id; with
/// neither, the report is skipped. Errors without a code are skipped with their
/// instances, and invalid instances without a snippet are dropped.
pub fn assemble(reports: &[IndexedReport], prompts: &[PromptItem]) -> Assembly {
    let mut errors: Vec<ErrorGroup> = Vec::new();
    let mut by_key: HashMap<(String, String), usize> = HashMap::new();
    let mut findings: Vec<Finding> = Vec::new();

    for indexed in reports {
        let report = &indexed.report;
        let group_id = report
            .group_id
            .clone()
            .or_else(|| prompts.get(indexed.index).and_then(|p| p.group_id.clone()));
        let Some(group_id) = group_id else {
            warn!(prompt = indexed.index, "group report without group id skipped");
            continue;
        };

        for error in &report.errors {
            let Some(code) = error.code.as_deref().map(str::trim).filter(|c| !c.is_empty()) else {
                debug!(group_id = %group_id, "error without code skipped");
                continue;
            };

            let raw_instances = serde_json::to_value(&error.instances).unwrap_or_default();
            let key = (group_id.clone(), code.to_string());
            let slot = match by_key.get(&key).copied() {
                Some(slot) => {
                    if let (Some(existing), serde_json::Value::Array(more)) =
                        (errors[slot].instances.as_array_mut(), raw_instances)
                    {
                        existing.extend(more);
                    }
                    slot
                }
                None => {
                    errors.push(error_group(&group_id, code, report, error, raw_instances));
                    by_key.insert(key, errors.len() - 1);
                    errors.len() - 1
                }
            };
            let error_id = errors[slot].id.clone();

            for instance in &error.instances {
                if let Some(finding) = to_finding(&error_id, &group_id, code, error, instance) {
                    findings.push(finding);
                }
            }
        }
    }

    let (mut invalid, mut missing) = (Vec::new(), Vec::new());
    for finding in findings {
        match finding {
            Finding::Invalid(f) => invalid.push(f),
            Finding::Missing(f) => missing.push(f),
        }
    }
    for (n, f) in invalid.iter_mut().enumerate() {
        f.numeric_id = n as i64;
        f.html_id = n.to_string();
    }
    let offset = invalid.len();
    for (n, f) in missing.iter_mut().enumerate() {
        f.numeric_id = (offset + n) as i64;
        f.html_id = (offset + n).to_string();
    }

    Assembly {
        errors,
        invalid,
        missing,
    }
}

fn error_group(
    group_id: &str,
    code: &str,
    report: &crate::llm::GroupReport,
    error: &ErrorReport,
    raw_instances: serde_json::Value,
) -> ErrorGroup {
    let process = error.process.clone().unwrap_or_default();
    ErrorGroup {
        id: Uuid::new_v4().to_string(),
        group_id: group_id.to_string(),
        error_code: code.to_string(),
        verdict: error.verdict.as_ref().map(|v| v.status().to_string()),
        preliminary_notes: report.preliminary_notes.clone(),
        overall_critique: report.overall_critique.clone(),
        process_analysis: process.analysis.clone(),
        process_critique: process.critique.clone(),
        process_verification: process.verification.clone(),
        process_retrieval: process.retrieval_texts(),
        instances: raw_instances,
    }
}

fn to_finding(
    error_id: &str,
    group_id: &str,
    code: &str,
    error: &ErrorReport,
    instance: &Instance,
) -> Option<Finding> {
    let process = error.process.clone().unwrap_or_default();
    match instance.err_type {
        ErrType::Invalid => {
            let raw = instance.snippet.as_deref().unwrap_or_default();
            if raw.trim().is_empty() {
                debug!(error_id, "invalid instance without snippet skipped");
                return None;
            }
            let quote = clean_quote(raw);
            Some(Finding::Invalid(InvalidFinding {
                id: Uuid::new_v4().to_string(),
                error_id: error_id.to_string(),
                numeric_id: 0,
                html_id: String::new(),
                group_id: group_id.to_string(),
                error_code: code.to_string(),
                quote_lines: quote_lines(&quote),
                quote,
                original_quote: raw.to_string(),
                analysis: process.analysis,
                critique: process.critique,
                verification: process.verification,
                suggested_fix: instance.suggested_fix.clone(),
                rationale: instance.rationale.clone(),
                until_end_of_sentence: ends_with_ellipsis(raw),
                start_line: instance.line_start,
                end_line: instance.line_end,
                order_number: None,
            }))
        }
        ErrType::Missing => Some(Finding::Missing(MissingFinding {
            id: Uuid::new_v4().to_string(),
            error_id: error_id.to_string(),
            numeric_id: 0,
            html_id: String::new(),
            group_id: group_id.to_string(),
            error_code: code.to_string(),
            retrieval: process.retrieval_texts(),
            analysis: process.analysis,
            critique: process.critique,
            verification: process.verification,
            suggested_fix: instance.suggested_fix.clone(),
            rationale: instance.rationale.clone(),
        })),
    }
}

/// Assign `order_number` from document order and sort by it.
///
/// Findings whose id appears in `document_order` come first, in that order;
/// the rest follow by numeric id.
pub fn apply_document_order(invalid: &mut [InvalidFinding], document_order: &[String]) {
    let position: HashMap<&str, usize> = document_order
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();

    invalid.sort_by_key(|f| {
        (
            position.get(f.html_id.as_str()).copied().unwrap_or(usize::MAX),
            f.numeric_id,
        )
    });
    for (n, f) in invalid.iter_mut().enumerate() {
        f.order_number = Some(n as i64);
    }
}
