//! Shared helper functions for CLI commands.

use console::style;

use crate::config::Settings;
use crate::repository::DbContext;

/// Open the database, failing with a hint when it has not been initialised.
pub fn open_db(settings: &Settings) -> anyhow::Result<DbContext> {
    if settings.database_url.is_none() && !settings.database_path().exists() {
        anyhow::bail!(
            "database not found at {}; run 'tzcheck init' first",
            settings.database_path().display()
        );
    }
    Ok(settings.create_db_context())
}

/// Format an optional rouble amount.
pub fn format_rub(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.2} ₽", v))
        .unwrap_or_else(|| "-".to_string())
}

/// Format an optional integer.
pub fn format_opt(value: Option<i64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

/// Format milliseconds as seconds.
pub fn format_duration_ms(ms: Option<i64>) -> String {
    ms.map(|v| format!("{:.1}s", v as f64 / 1000.0))
        .unwrap_or_else(|| "-".to_string())
}

/// Truncate a string to `max` characters, appending `...` when cut.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", cut)
}

/// Colour a version status.
pub fn styled_status(status: &str) -> String {
    match status {
        "completed" => style(status).green().to_string(),
        "failed" => style(status).red().to_string(),
        _ => style(status).yellow().to_string(),
    }
}
