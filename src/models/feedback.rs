//! User feedback on findings.

use serde::{Deserialize, Serialize};

/// Which instance table a feedback targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    Invalid,
    Missing,
}

impl FeedbackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invalid => "invalid",
            Self::Missing => "missing",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "invalid" => Some(Self::Invalid),
            "missing" => Some(Self::Missing),
            _ => None,
        }
    }
}

/// A feedback submission for one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackUpdate {
    pub instance_id: String,
    pub kind: FeedbackKind,
    pub mark: Option<bool>,
    pub comment: Option<String>,
    pub user_id: String,
    /// Targets the verification feedback columns instead of the regular ones.
    #[serde(default)]
    pub is_verification: bool,
}

impl FeedbackUpdate {
    /// Reason the submission is unacceptable, if any.
    ///
    /// Either a mark or a non-blank comment is required, and a negative mark
    /// must come with a comment.
    pub fn validation_error(&self) -> Option<&'static str> {
        let has_comment = self
            .comment
            .as_deref()
            .is_some_and(|c| !c.trim().is_empty());
        match self.mark {
            None if !has_comment => Some("either mark or comment must be provided"),
            Some(false) if !has_comment => Some("comment is required when mark is false"),
            _ => None,
        }
    }
}

/// Feedback stored on an instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceFeedback {
    pub mark: Option<bool>,
    pub comment: Option<String>,
    pub user_id: Option<String>,
}

/// A persisted finding with its user feedback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stored<T> {
    #[serde(flatten)]
    pub finding: T,
    pub feedback: Option<InstanceFeedback>,
    pub verification_feedback: Option<InstanceFeedback>,
}

/// One feedback row in the feedback listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub instance_id: String,
    pub kind: FeedbackKind,
    pub mark: Option<bool>,
    pub comment: Option<String>,
    pub user_id: Option<String>,
    pub error_id: String,
    pub error_code: String,
    pub version_id: String,
    pub spec_name: String,
}
