//! Flattened LLM findings.
//!
//! A finding is either anchored to a quote in the document (`invalid`) or
//! describes something absent from it (`missing`). The two variants are kept
//! in separate structs so anchoring fields never exist on missing findings.

use serde::{Deserialize, Serialize};

/// One `(group_id, error_code)` pair reported by the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorGroup {
    pub id: String,
    pub group_id: String,
    pub error_code: String,
    pub verdict: Option<String>,
    pub preliminary_notes: Option<String>,
    pub overall_critique: Option<String>,
    pub process_analysis: Option<String>,
    pub process_critique: Option<String>,
    pub process_verification: Option<String>,
    pub process_retrieval: Vec<String>,
    /// Raw instances array as the LLM returned it.
    pub instances: serde_json::Value,
}

/// A finding anchored to a quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidFinding {
    pub id: String,
    pub error_id: String,
    pub numeric_id: i64,
    pub html_id: String,
    pub group_id: String,
    pub error_code: String,
    /// Quote with Markdown residue removed.
    pub quote: String,
    /// Snippet exactly as the LLM returned it.
    pub original_quote: String,
    pub quote_lines: Option<Vec<String>>,
    pub analysis: Option<String>,
    pub critique: Option<String>,
    pub verification: Option<String>,
    pub suggested_fix: Option<String>,
    pub rationale: Option<String>,
    pub until_end_of_sentence: bool,
    pub start_line: Option<i64>,
    pub end_line: Option<i64>,
    /// Position in document order, set once the HTML is annotated.
    pub order_number: Option<i64>,
}

/// A finding about something the document lacks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingFinding {
    pub id: String,
    pub error_id: String,
    pub numeric_id: i64,
    pub html_id: String,
    pub group_id: String,
    pub error_code: String,
    pub analysis: Option<String>,
    pub critique: Option<String>,
    pub verification: Option<String>,
    pub suggested_fix: Option<String>,
    pub rationale: Option<String>,
    pub retrieval: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "err_type", rename_all = "snake_case")]
pub enum Finding {
    Invalid(InvalidFinding),
    Missing(MissingFinding),
}

impl Finding {
    pub fn numeric_id(&self) -> i64 {
        match self {
            Self::Invalid(f) => f.numeric_id,
            Self::Missing(f) => f.numeric_id,
        }
    }

    pub fn error_id(&self) -> &str {
        match self {
            Self::Invalid(f) => &f.error_id,
            Self::Missing(f) => &f.error_id,
        }
    }
}
