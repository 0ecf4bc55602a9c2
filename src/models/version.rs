use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ErrorGroup, InvalidFinding, MissingFinding, Stored};

/// Lifecycle state of a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    InProgress,
    Completed,
    Failed,
}

impl VersionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One checked revision of a technical specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub id: String,
    pub spec_id: String,
    pub spec_name: String,
    pub user_id: String,
    pub version_number: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: VersionStatus,
    /// 0..=100; only meaningful while in progress.
    pub progress: i32,
    pub original_file_id: Option<String>,
    pub original_file_size: Option<i64>,
    pub out_html: Option<String>,
    pub css: Option<String>,
    pub report_file_id: Option<String>,
    pub tokens_total: Option<i64>,
    pub cost_total_rub: Option<f64>,
    pub inspection_duration_ms: Option<i64>,
    pub number_of_errors: Option<i64>,
    pub llm_report: Option<serde_json::Value>,
    pub failure_code: Option<String>,
    pub failure_message: Option<String>,
}

/// A version with everything it owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionDetail {
    pub version: Version,
    pub errors: Vec<ErrorGroup>,
    /// Ordered by `order_number`.
    pub invalid_instances: Vec<Stored<InvalidFinding>>,
    pub missing_instances: Vec<Stored<MissingFinding>>,
}
