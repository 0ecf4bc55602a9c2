//! Per-finding localisation audit.

use serde::Serialize;

use super::locator::Strategy;

const SNIPPET_PREVIEW_CHARS: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditStatus {
    Found,
    NotFound,
    Skipped,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Found => "found",
            Self::NotFound => "not-found",
            Self::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub error_id: String,
    pub group_id: String,
    pub code: String,
    pub line_start: Option<i64>,
    pub line_end: Option<i64>,
    /// Fragments the locator evaluated.
    pub candidates: usize,
    pub chosen_element: Option<String>,
    pub strategy: Option<Strategy>,
    pub status: AuditStatus,
    pub reason: Option<String>,
    pub snippet: String,
}

impl AuditEntry {
    /// Shorten a snippet for the audit: newlines flattened, at most 120 chars.
    pub fn preview(snippet: &str) -> String {
        snippet
            .chars()
            .map(|c| if c == '\n' || c == '\r' || c == '\t' { ' ' } else { c })
            .take(SNIPPET_PREVIEW_CHARS)
            .collect()
    }
}

/// Render entries as tab-separated values with a header row.
pub fn to_tsv(entries: &[AuditEntry]) -> String {
    let mut out = String::from(
        "error_id\tgroup_id\tcode\tline_start\tline_end\tcandidates\tchosen_element\tstrategy\tstatus\treason\tsnippet\n",
    );
    for e in entries {
        let fields = [
            e.error_id.clone(),
            e.group_id.clone(),
            e.code.clone(),
            opt(e.line_start),
            opt(e.line_end),
            e.candidates.to_string(),
            e.chosen_element.clone().unwrap_or_default(),
            e.strategy.map(|s| s.as_str().to_string()).unwrap_or_default(),
            e.status.as_str().to_string(),
            e.reason.clone().unwrap_or_default(),
            AuditEntry::preview(&e.snippet),
        ];
        out.push_str(&fields.join("\t"));
        out.push('\n');
    }
    out
}

fn opt(v: Option<i64>) -> String {
    v.map(|n| n.to_string()).unwrap_or_default()
}
