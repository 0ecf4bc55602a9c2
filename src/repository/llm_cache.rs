//! LLM response cache table.

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::RunQueryDsl;
use tracing::info;

use super::models::NewLlmCache;
use super::pool::{DbError, SqlitePool};
use crate::llm::{CacheError, ResponseCache};
use crate::schema::llm_cache;

#[derive(Clone)]
pub struct LlmCacheRepository {
    pool: SqlitePool,
}

impl LlmCacheRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_response(&self, messages_hash: &str) -> Result<Option<String>, DbError> {
        let mut conn = self.pool.get().await?;

        llm_cache::table
            .filter(llm_cache::messages_hash.eq(messages_hash))
            .select(llm_cache::response_data)
            .first(&mut conn)
            .await
            .optional()
    }

    /// Insert or replace the response stored under `messages_hash`.
    pub async fn save_response(&self, messages_hash: &str, response_data: &str) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        let now = Utc::now().to_rfc3339();

        diesel::insert_into(llm_cache::table)
            .values(&NewLlmCache {
                messages_hash,
                response_data,
                created_at: &now,
            })
            .on_conflict(llm_cache::messages_hash)
            .do_update()
            .set((
                llm_cache::response_data.eq(excluded(llm_cache::response_data)),
                llm_cache::created_at.eq(excluded(llm_cache::created_at)),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    pub async fn count(&self) -> Result<i64, DbError> {
        let mut conn = self.pool.get().await?;

        llm_cache::table
            .select(diesel::dsl::count_star())
            .first(&mut conn)
            .await
    }

    /// Delete every cached response. Returns the number removed.
    pub async fn purge(&self) -> Result<usize, DbError> {
        let mut conn = self.pool.get().await?;

        let removed = diesel::delete(llm_cache::table).execute(&mut conn).await?;
        info!(removed, "LLM cache purged");
        Ok(removed)
    }
}

#[async_trait]
impl ResponseCache for LlmCacheRepository {
    async fn get(&self, messages_hash: &str) -> Result<Option<String>, CacheError> {
        self.get_response(messages_hash)
            .await
            .map_err(|e| CacheError::Storage(e.to_string()))
    }

    async fn put(&self, messages_hash: &str, response_data: &str) -> Result<(), CacheError> {
        self.save_response(messages_hash, response_data)
            .await
            .map_err(|e| CacheError::Storage(e.to_string()))
    }
}
