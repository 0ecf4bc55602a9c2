//! Database context for managing connections and repository access.
//!
//! The DbContext is the primary entry point for all database operations.
//! It holds the connection factory and hands out the repositories.

use std::path::Path;

use diesel_async::SimpleAsyncConnection;

use super::analytics::AnalyticsRepository;
use super::feedback::FeedbackRepository;
use super::llm_cache::LlmCacheRepository;
use super::pool::{DbError, SqlitePool};
use super::runs::RunRepository;

/// # Example
/// ```ignore
/// let ctx = DbContext::from_url("sqlite:/var/lib/tzcheck/tzcheck.db");
/// ctx.init_schema().await?;
/// let detail = ctx.runs().get_version(&id).await?;
/// ```
#[derive(Debug, Clone)]
pub struct DbContext {
    pool: SqlitePool,
}

impl DbContext {
    /// Create a context from a database file path.
    pub fn new(db_path: &Path) -> Self {
        Self {
            pool: SqlitePool::from_path(db_path),
        }
    }

    /// Create a context from a `sqlite:` URL or a plain path.
    pub fn from_url(url: &str) -> Self {
        Self {
            pool: SqlitePool::new(url),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn runs(&self) -> RunRepository {
        RunRepository::new(self.pool.clone())
    }

    pub fn feedback(&self) -> FeedbackRepository {
        FeedbackRepository::new(self.pool.clone())
    }

    pub fn analytics(&self) -> AnalyticsRepository {
        AnalyticsRepository::new(self.pool.clone())
    }

    pub fn llm_cache(&self) -> LlmCacheRepository {
        LlmCacheRepository::new(self.pool.clone())
    }

    /// Create all tables and indexes if they do not exist.
    pub async fn init_schema(&self) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        conn.batch_execute(include_str!("schema_sqlite.sql")).await
    }
}

#[cfg(test)]
pub(crate) async fn test_context() -> (DbContext, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let ctx = DbContext::new(&dir.path().join("test.db"));
    ctx.init_schema().await.unwrap();
    (ctx, dir)
}
