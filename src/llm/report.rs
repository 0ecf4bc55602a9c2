//! Wire types exchanged with the LLM service.

use serde::{Deserialize, Deserializer, Serialize};

/// One chat message of a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// A prompt for one error group, as produced by the prompt builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptItem {
    #[serde(default, deserialize_with = "de_opt_id")]
    pub group_id: Option<String>,
    #[serde(default, alias = "groupName")]
    pub group_name: Option<String>,
    #[serde(default, alias = "groupDescription")]
    pub group_description: Option<String>,
    #[serde(default, alias = "errorCodeIds")]
    pub error_code_ids: Vec<serde_json::Value>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// Successful LLM response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    #[serde(default)]
    pub result: Option<GroupReport>,
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub cost: Option<Cost>,
}

impl LlmResponse {
    pub fn tokens(&self) -> Option<i64> {
        self.usage.as_ref().and_then(|u| u.total_tokens)
    }

    pub fn cost_rub(&self) -> Option<f64> {
        self.cost.as_ref().and_then(|c| c.total_rub)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: Option<i64>,
    #[serde(default)]
    pub completion_tokens: Option<i64>,
    #[serde(default)]
    pub total_tokens: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cost {
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub total_rub: Option<f64>,
}

/// The LLM's analysis of one error group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupReport {
    #[serde(default, deserialize_with = "de_opt_id")]
    pub group_id: Option<String>,
    #[serde(default)]
    pub preliminary_notes: Option<String>,
    #[serde(default)]
    pub overall_critique: Option<String>,
    #[serde(default, deserialize_with = "de_null_vec")]
    pub errors: Vec<ErrorReport>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub verdict: Option<Verdict>,
    #[serde(default)]
    pub process: Option<Process>,
    #[serde(default, deserialize_with = "de_null_vec")]
    pub instances: Vec<Instance>,
}

/// Verdict either as plain text or as `{status, text_verdict}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Verdict {
    Text(String),
    Detailed {
        status: String,
        #[serde(default)]
        text_verdict: Option<String>,
    },
}

impl Verdict {
    pub fn status(&self) -> &str {
        match self {
            Self::Text(s) => s,
            Self::Detailed { status, .. } => status,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Process {
    #[serde(default)]
    pub analysis: Option<String>,
    #[serde(default)]
    pub critique: Option<String>,
    #[serde(default)]
    pub verification: Option<String>,
    #[serde(default, deserialize_with = "de_null_vec")]
    pub retrieval: Vec<Retrieval>,
}

impl Process {
    /// Non-empty retrieval texts.
    pub fn retrieval_texts(&self) -> Vec<String> {
        self.retrieval
            .iter()
            .filter_map(|r| r.text.clone())
            .filter(|t| !t.trim().is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Retrieval {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub line_start: Option<i64>,
    #[serde(default)]
    pub line_end: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrType {
    Invalid,
    Missing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub err_type: ErrType,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub line_start: Option<i64>,
    #[serde(default)]
    pub line_end: Option<i64>,
    #[serde(default)]
    pub suggested_fix: Option<String>,
    #[serde(default)]
    pub rationale: Option<String>,
}

/// Ids arrive as numbers or strings; keep them as strings.
fn de_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn de_null_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_with_numeric_group_and_usage() {
        let json = r#"{
            "result": {
                "group_id": 7,
                "errors": [{
                    "code": "E12",
                    "verdict": {"status": "error", "text_verdict": "есть"},
                    "process": {"analysis": "a", "retrieval": [{"text": "r1"}, {"text": " "}]},
                    "instances": [{"err_type": "invalid", "snippet": "текст", "line_start": 3}]
                }]
            },
            "usage": {"total_tokens": 120},
            "cost": {"total_rub": 1.5}
        }"#;
        let resp: LlmResponse = serde_json::from_str(json).unwrap();
        let report = resp.result.as_ref().unwrap();
        assert_eq!(report.group_id.as_deref(), Some("7"));
        let error = &report.errors[0];
        assert_eq!(error.verdict.as_ref().unwrap().status(), "error");
        assert_eq!(error.process.as_ref().unwrap().retrieval_texts(), vec!["r1"]);
        assert_eq!(error.instances[0].err_type, ErrType::Invalid);
        assert_eq!(resp.tokens(), Some(120));
        assert_eq!(resp.cost_rub(), Some(1.5));
    }

    #[test]
    fn test_null_result_and_lists() {
        let resp: LlmResponse = serde_json::from_str(r#"{"result": null}"#).unwrap();
        assert!(resp.result.is_none());
        let report: GroupReport =
            serde_json::from_str(r#"{"group_id": "", "errors": null}"#).unwrap();
        assert!(report.group_id.is_none());
        assert!(report.errors.is_empty());
    }

    #[test]
    fn test_prompt_item_aliases() {
        let item: PromptItem = serde_json::from_str(
            r#"{"group_id": 2, "groupName": "Терминология", "messages": [{"role": "user", "content": "x"}]}"#,
        )
        .unwrap();
        assert_eq!(item.group_id.as_deref(), Some("2"));
        assert_eq!(item.group_name.as_deref(), Some("Терминология"));
        assert_eq!(item.messages.len(), 1);
    }
}
