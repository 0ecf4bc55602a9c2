//! Diesel row types.

use diesel::prelude::*;

use crate::schema;

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::technical_specifications)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SpecificationRecord {
    pub id: String,
    pub name: String,
    pub user_id: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::technical_specifications)]
pub struct NewSpecification<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub user_id: &'a str,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::versions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct VersionRecord {
    pub id: String,
    pub technical_specification_id: String,
    pub version_number: i64,
    pub created_at: String,
    pub updated_at: String,
    pub status: String,
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
    pub llm_report: Option<String>,
    pub failure_code: Option<String>,
    pub failure_message: Option<String>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::versions)]
pub struct NewVersion<'a> {
    pub id: &'a str,
    pub technical_specification_id: &'a str,
    pub version_number: i64,
    pub created_at: &'a str,
    pub updated_at: &'a str,
    pub status: &'a str,
    pub progress: i32,
    pub original_file_id: Option<&'a str>,
    pub original_file_size: Option<i64>,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::errors)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ErrorRecord {
    pub id: String,
    pub version_id: String,
    pub group_id: String,
    pub error_code: String,
    pub order_number: i64,
    pub verdict: Option<String>,
    pub preliminary_notes: Option<String>,
    pub overall_critique: Option<String>,
    pub process_analysis: Option<String>,
    pub process_critique: Option<String>,
    pub process_verification: Option<String>,
    pub process_retrieval: String,
    pub instances: String,
    pub created_at: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::errors)]
pub struct NewError<'a> {
    pub id: &'a str,
    pub version_id: &'a str,
    pub group_id: &'a str,
    pub error_code: &'a str,
    pub order_number: i64,
    pub verdict: Option<&'a str>,
    pub preliminary_notes: Option<&'a str>,
    pub overall_critique: Option<&'a str>,
    pub process_analysis: Option<&'a str>,
    pub process_critique: Option<&'a str>,
    pub process_verification: Option<&'a str>,
    pub process_retrieval: String,
    pub instances: String,
    pub created_at: &'a str,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::invalid_instances)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct InvalidInstanceRecord {
    pub id: String,
    pub error_id: String,
    pub version_id: String,
    pub numeric_id: i64,
    pub html_id: String,
    pub quote: String,
    pub original_quote: String,
    pub quote_lines: Option<String>,
    pub analysis: Option<String>,
    pub critique: Option<String>,
    pub verification: Option<String>,
    pub suggested_fix: Option<String>,
    pub rationale: Option<String>,
    pub until_end_of_sentence: bool,
    pub start_line: Option<i64>,
    pub end_line: Option<i64>,
    pub order_number: Option<i64>,
    pub feedback_exists: bool,
    pub feedback_mark: Option<bool>,
    pub feedback_comment: Option<String>,
    pub feedback_user: Option<String>,
    pub verification_feedback_exists: bool,
    pub verification_feedback_mark: Option<bool>,
    pub verification_feedback_comment: Option<String>,
    pub verification_feedback_user: Option<String>,
    pub created_at: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::invalid_instances)]
pub struct NewInvalidInstance<'a> {
    pub id: &'a str,
    pub error_id: &'a str,
    pub version_id: &'a str,
    pub numeric_id: i64,
    pub html_id: &'a str,
    pub quote: &'a str,
    pub original_quote: &'a str,
    pub quote_lines: Option<String>,
    pub analysis: Option<&'a str>,
    pub critique: Option<&'a str>,
    pub verification: Option<&'a str>,
    pub suggested_fix: Option<&'a str>,
    pub rationale: Option<&'a str>,
    pub until_end_of_sentence: bool,
    pub start_line: Option<i64>,
    pub end_line: Option<i64>,
    pub order_number: Option<i64>,
    pub created_at: &'a str,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::missing_instances)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct MissingInstanceRecord {
    pub id: String,
    pub error_id: String,
    pub version_id: String,
    pub numeric_id: i64,
    pub html_id: String,
    pub analysis: Option<String>,
    pub critique: Option<String>,
    pub verification: Option<String>,
    pub suggested_fix: Option<String>,
    pub rationale: Option<String>,
    pub retrieval: String,
    pub feedback_exists: bool,
    pub feedback_mark: Option<bool>,
    pub feedback_comment: Option<String>,
    pub feedback_user: Option<String>,
    pub verification_feedback_exists: bool,
    pub verification_feedback_mark: Option<bool>,
    pub verification_feedback_comment: Option<String>,
    pub verification_feedback_user: Option<String>,
    pub created_at: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::missing_instances)]
pub struct NewMissingInstance<'a> {
    pub id: &'a str,
    pub error_id: &'a str,
    pub version_id: &'a str,
    pub numeric_id: i64,
    pub html_id: &'a str,
    pub analysis: Option<&'a str>,
    pub critique: Option<&'a str>,
    pub verification: Option<&'a str>,
    pub suggested_fix: Option<&'a str>,
    pub rationale: Option<&'a str>,
    pub retrieval: String,
    pub created_at: &'a str,
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = schema::llm_cache)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct LlmCacheRecord {
    pub id: i32,
    pub messages_hash: String,
    pub response_data: String,
    pub created_at: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::llm_cache)]
pub struct NewLlmCache<'a> {
    pub messages_hash: &'a str,
    pub response_data: &'a str,
    pub created_at: &'a str,
}
