//! User feedback on persisted instances.

use diesel::prelude::*;
use diesel::sql_types::{BigInt, Bool, Nullable, Text};
use diesel_async::RunQueryDsl;
use thiserror::Error;
use tracing::info;

use super::pool::{DbError, SqlitePool};
use crate::models::{FeedbackEntry, FeedbackKind, FeedbackUpdate};
use crate::schema::{invalid_instances, missing_instances};

#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("invalid feedback: {0}")]
    Validation(&'static str),
    #[error("{kind} instance not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("database error: {0}")]
    Database(#[from] DbError),
}

impl FeedbackError {
    /// HTTP status an API layer should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound { .. } => 404,
            Self::Database(_) => 500,
        }
    }
}

#[derive(QueryableByName)]
struct FeedbackRow {
    #[diesel(sql_type = Text)]
    instance_id: String,
    #[diesel(sql_type = Text)]
    instance_type: String,
    #[diesel(sql_type = Nullable<Bool>)]
    feedback_mark: Option<bool>,
    #[diesel(sql_type = Nullable<Text>)]
    feedback_comment: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    feedback_user: Option<String>,
    #[diesel(sql_type = Text)]
    error_id: String,
    #[diesel(sql_type = Text)]
    error_code: String,
    #[diesel(sql_type = Text)]
    version_id: String,
    #[diesel(sql_type = Text)]
    spec_name: String,
}

#[derive(QueryableByName)]
struct Count {
    #[diesel(sql_type = BigInt)]
    count: i64,
}

const FEEDBACKS_SQL: &str = "
    WITH feedbacks AS (
        SELECT id AS instance_id, 'invalid' AS instance_type, feedback_mark,
               feedback_comment, feedback_user, error_id
        FROM invalid_instances WHERE feedback_exists = 1
        UNION ALL
        SELECT id AS instance_id, 'missing' AS instance_type, feedback_mark,
               feedback_comment, feedback_user, error_id
        FROM missing_instances WHERE feedback_exists = 1
    )
    SELECT f.instance_id, f.instance_type, f.feedback_mark, f.feedback_comment,
           f.feedback_user, f.error_id, e.error_code, v.id AS version_id,
           ts.name AS spec_name
    FROM feedbacks f
    JOIN errors e ON f.error_id = e.id
    JOIN versions v ON e.version_id = v.id
    JOIN technical_specifications ts ON v.technical_specification_id = ts.id";

const FEEDBACKS_ORDER: &str = " ORDER BY ts.name, v.id, f.instance_type, f.instance_id";

#[derive(Clone)]
pub struct FeedbackRepository {
    pool: SqlitePool,
}

impl FeedbackRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Validate and store feedback on one instance.
    pub async fn update_instance_feedback(&self, update: &FeedbackUpdate) -> Result<(), FeedbackError> {
        if let Some(reason) = update.validation_error() {
            return Err(FeedbackError::Validation(reason));
        }

        let table = match update.kind {
            FeedbackKind::Invalid => "invalid_instances",
            FeedbackKind::Missing => "missing_instances",
        };
        let prefix = if update.is_verification {
            "verification_feedback"
        } else {
            "feedback"
        };
        let sql = format!(
            "UPDATE {table} SET {prefix}_exists = 1, {prefix}_mark = ?, \
             {prefix}_comment = ?, {prefix}_user = ? WHERE id = ?"
        );
        let comment = update.comment.as_deref().map(str::trim).filter(|c| !c.is_empty());

        let mut conn = self.pool.get().await?;
        let rows = diesel::sql_query(sql)
            .bind::<Nullable<Bool>, _>(update.mark)
            .bind::<Nullable<Text>, _>(comment)
            .bind::<Text, _>(&update.user_id)
            .bind::<Text, _>(&update.instance_id)
            .execute(&mut conn)
            .await?;

        if rows == 0 {
            return Err(FeedbackError::NotFound {
                kind: update.kind.as_str(),
                id: update.instance_id.clone(),
            });
        }
        info!(
            instance_id = %update.instance_id,
            kind = update.kind.as_str(),
            verification = update.is_verification,
            "feedback stored"
        );
        Ok(())
    }

    /// All feedback, optionally only the given user's.
    pub async fn feedbacks(&self, user_id: Option<&str>) -> Result<Vec<FeedbackEntry>, DbError> {
        let mut conn = self.pool.get().await?;

        let rows: Vec<FeedbackRow> = match user_id.filter(|u| !u.is_empty()) {
            Some(user) => {
                diesel::sql_query(format!("{FEEDBACKS_SQL} WHERE f.feedback_user = ?{FEEDBACKS_ORDER}"))
                    .bind::<Text, _>(user)
                    .load(&mut conn)
                    .await?
            }
            None => {
                diesel::sql_query(format!("{FEEDBACKS_SQL}{FEEDBACKS_ORDER}"))
                    .load(&mut conn)
                    .await?
            }
        };

        Ok(rows
            .into_iter()
            .map(|r| FeedbackEntry {
                kind: FeedbackKind::from_str(&r.instance_type).unwrap_or(FeedbackKind::Invalid),
                instance_id: r.instance_id,
                mark: r.feedback_mark,
                comment: r.feedback_comment,
                user_id: r.feedback_user,
                error_id: r.error_id,
                error_code: r.error_code,
                version_id: r.version_id,
                spec_name: r.spec_name,
            })
            .collect())
    }

    /// Number of instances of either kind carrying feedback.
    pub async fn count(&self) -> Result<i64, DbError> {
        let mut conn = self.pool.get().await?;
        let row: Count = diesel::sql_query(
            "SELECT (SELECT COUNT(*) FROM invalid_instances WHERE feedback_exists = 1) + \
             (SELECT COUNT(*) FROM missing_instances WHERE feedback_exists = 1) AS count",
        )
        .get_result(&mut conn)
        .await?;
        Ok(row.count)
    }

    /// Resolve a numeric id to the instance UUID, invalid instances first.
    ///
    /// Numeric ids restart at zero in every version; without `version_id` the
    /// most recently created match wins.
    pub async fn uuid_by_numeric_id(
        &self,
        numeric_id: i64,
        version_id: Option<&str>,
    ) -> Result<Option<String>, DbError> {
        let mut conn = self.pool.get().await?;

        let mut invalid = invalid_instances::table
            .filter(invalid_instances::numeric_id.eq(numeric_id))
            .select(invalid_instances::id)
            .order(invalid_instances::created_at.desc())
            .into_boxed();
        if let Some(v) = version_id {
            invalid = invalid.filter(invalid_instances::version_id.eq(v));
        }
        if let Some(id) = invalid.first::<String>(&mut conn).await.optional()? {
            return Ok(Some(id));
        }

        let mut missing = missing_instances::table
            .filter(missing_instances::numeric_id.eq(numeric_id))
            .select(missing_instances::id)
            .order(missing_instances::created_at.desc())
            .into_boxed();
        if let Some(v) = version_id {
            missing = missing.filter(missing_instances::version_id.eq(v));
        }
        missing.first::<String>(&mut conn).await.optional()
    }
}
