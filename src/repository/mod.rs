//! Repository layer for database persistence.
//!
//! All database access uses Diesel over SQLite through diesel-async's
//! `SyncConnectionWrapper`.

pub mod analytics;
pub mod context;
pub mod feedback;
pub mod llm_cache;
pub mod models;
pub mod pool;
pub mod runs;
pub mod util;

pub use analytics::{
    parse_offset, AnalyticsRepository, DailyPoint, DashboardRow, DateRange, Metric, VersionMe,
    VersionStatistics,
};
pub use context::DbContext;
pub use feedback::{FeedbackError, FeedbackRepository};
pub use llm_cache::LlmCacheRepository;
pub use pool::{DbError, SqlitePool};
pub use runs::{CompletedRun, RunHandle, RunRepository};
