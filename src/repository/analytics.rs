//! Read-only reports over versions.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Double, Nullable};
use diesel_async::RunQueryDsl;
use serde::Serialize;

use super::pool::{DbError, SqlitePool};
use super::util::parse_datetime;
use crate::schema::{technical_specifications, versions};

/// One row of the admin version listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardRow {
    pub version_id: String,
    pub spec_name: String,
    pub user_id: String,
    pub version_number: i64,
    pub status: String,
    pub tokens_total: Option<i64>,
    pub cost_total_rub: Option<f64>,
    pub number_of_errors: i64,
    pub inspection_duration_ms: Option<i64>,
    pub original_file_size: i64,
    pub created_at: DateTime<Utc>,
    pub original_file_id: Option<String>,
    pub report_file_id: Option<String>,
}

/// One row of a user's own version listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionMe {
    pub version_id: String,
    pub spec_name: String,
    pub version_number: i64,
    pub created_at: DateTime<Utc>,
    pub original_file_id: Option<String>,
    pub report_file_id: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VersionStatistics {
    pub total_versions: i64,
    pub total_tokens: Option<i64>,
    pub total_rub: Option<f64>,
    pub average_duration_ms: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

/// Metric selectable in daily analytics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// Tokens spent.
    Consumption,
    /// Roubles spent.
    ToPay,
    /// Number of checked documents.
    Tz,
}

impl Metric {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "consumption" => Some(Self::Consumption),
            "toPay" => Some(Self::ToPay),
            "tz" => Some(Self::Tz),
            _ => None,
        }
    }
}

/// One day of analytics. Metrics that were not requested are `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyPoint {
    pub date: NaiveDate,
    pub consumption: Option<i64>,
    pub to_pay: Option<f64>,
    pub tz: Option<i64>,
}

/// Parse `UTC`, `Z` or a `±HH:MM` offset.
pub fn parse_offset(s: &str) -> Option<FixedOffset> {
    let s = s.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("utc") || s == "Z" {
        return FixedOffset::east_opt(0);
    }
    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => return None,
    };
    let (h, m) = rest.split_once(':').unwrap_or((rest, "0"));
    let h: i32 = h.parse().ok()?;
    let m: i32 = m.parse().ok()?;
    if h > 14 || m > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (h * 3600 + m * 60))
}

#[derive(QueryableByName)]
struct StatisticsRow {
    #[diesel(sql_type = BigInt)]
    total_versions: i64,
    #[diesel(sql_type = Nullable<BigInt>)]
    total_tokens: Option<i64>,
    #[diesel(sql_type = Nullable<Double>)]
    total_rub: Option<f64>,
    #[diesel(sql_type = Nullable<Double>)]
    average_duration_ms: Option<f64>,
}

type DashboardTuple = (
    String,
    String,
    String,
    i64,
    String,
    Option<i64>,
    Option<f64>,
    Option<i64>,
    Option<i64>,
    Option<i64>,
    String,
    Option<String>,
    Option<String>,
);

#[derive(Clone)]
pub struct AnalyticsRepository {
    pool: SqlitePool,
}

impl AnalyticsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Every version, newest first, optionally for one user.
    pub async fn admin_dashboard(&self, user_id: Option<&str>) -> Result<Vec<DashboardRow>, DbError> {
        let mut conn = self.pool.get().await?;

        let mut query = versions::table
            .inner_join(technical_specifications::table)
            .select((
                versions::id,
                technical_specifications::name,
                technical_specifications::user_id,
                versions::version_number,
                versions::status,
                versions::tokens_total,
                versions::cost_total_rub,
                versions::number_of_errors,
                versions::inspection_duration_ms,
                versions::original_file_size,
                versions::created_at,
                versions::original_file_id,
                versions::report_file_id,
            ))
            .order(versions::created_at.desc())
            .into_boxed();
        if let Some(user) = user_id {
            query = query.filter(technical_specifications::user_id.eq(user));
        }

        let rows: Vec<DashboardTuple> = query.load(&mut conn).await?;
        Ok(rows
            .into_iter()
            .map(|r| DashboardRow {
                version_id: r.0,
                spec_name: r.1,
                user_id: r.2,
                version_number: r.3,
                status: r.4,
                tokens_total: r.5,
                cost_total_rub: r.6,
                number_of_errors: r.7.unwrap_or(0),
                inspection_duration_ms: r.8,
                original_file_size: r.9.unwrap_or(0),
                created_at: parse_datetime(&r.10),
                original_file_id: r.11,
                report_file_id: r.12,
            })
            .collect())
    }

    /// A user's versions, newest first.
    pub async fn versions_me(&self, user_id: &str) -> Result<Vec<VersionMe>, DbError> {
        let mut conn = self.pool.get().await?;

        let rows: Vec<(String, String, i64, String, Option<String>, Option<String>, String)> =
            versions::table
                .inner_join(technical_specifications::table)
                .filter(technical_specifications::user_id.eq(user_id))
                .select((
                    versions::id,
                    technical_specifications::name,
                    versions::version_number,
                    versions::created_at,
                    versions::original_file_id,
                    versions::report_file_id,
                    versions::status,
                ))
                .order(versions::created_at.desc())
                .load(&mut conn)
                .await?;

        Ok(rows
            .into_iter()
            .map(|r| VersionMe {
                version_id: r.0,
                spec_name: r.1,
                version_number: r.2,
                created_at: parse_datetime(&r.3),
                original_file_id: r.4,
                report_file_id: r.5,
                status: r.6,
            })
            .collect())
    }

    /// Totals over versions that recorded any usage or duration.
    pub async fn statistics(&self) -> Result<VersionStatistics, DbError> {
        let mut conn = self.pool.get().await?;

        let row: StatisticsRow = diesel::sql_query(
            "SELECT COUNT(*) AS total_versions, SUM(tokens_total) AS total_tokens,
                    SUM(cost_total_rub) AS total_rub,
                    AVG(inspection_duration_ms) AS average_duration_ms
             FROM versions
             WHERE tokens_total IS NOT NULL
                OR cost_total_rub IS NOT NULL
                OR inspection_duration_ms IS NOT NULL",
        )
        .get_result(&mut conn)
        .await?;

        Ok(VersionStatistics {
            total_versions: row.total_versions,
            total_tokens: row.total_tokens,
            total_rub: row.total_rub,
            average_duration_ms: row.average_duration_ms,
        })
    }

    /// First and last UTC day with a version, if any.
    pub async fn date_range(&self) -> Result<Option<DateRange>, DbError> {
        let mut conn = self.pool.get().await?;

        let (min, max): (Option<String>, Option<String>) = versions::table
            .select((
                diesel::dsl::min(versions::created_at),
                diesel::dsl::max(versions::created_at),
            ))
            .first(&mut conn)
            .await?;

        Ok(match (min, max) {
            (Some(min), Some(max)) => Some(DateRange {
                from: parse_datetime(&min).date_naive(),
                to: parse_datetime(&max).date_naive(),
            }),
            _ => None,
        })
    }

    /// Per-day totals between `from` and `to` inclusive, in the given offset.
    ///
    /// An empty `metrics` list selects every metric. Days without versions are
    /// omitted.
    pub async fn daily_analytics(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        offset: FixedOffset,
        metrics: &[Metric],
    ) -> Result<Vec<DailyPoint>, DbError> {
        let mut conn = self.pool.get().await?;

        // Widen the UTC window by a day each side; exact bucketing happens below.
        let lo = (from - Duration::days(1)).format("%Y-%m-%d").to_string();
        let hi = (to + Duration::days(2)).format("%Y-%m-%d").to_string();
        let rows: Vec<(String, Option<i64>, Option<f64>)> = versions::table
            .filter(versions::created_at.ge(&lo))
            .filter(versions::created_at.lt(&hi))
            .select((
                versions::created_at,
                versions::tokens_total,
                versions::cost_total_rub,
            ))
            .load(&mut conn)
            .await?;

        Ok(bucket_daily(&rows, from, to, offset, metrics))
    }
}

fn bucket_daily(
    rows: &[(String, Option<i64>, Option<f64>)],
    from: NaiveDate,
    to: NaiveDate,
    offset: FixedOffset,
    metrics: &[Metric],
) -> Vec<DailyPoint> {
    let wants = |m: Metric| metrics.is_empty() || metrics.contains(&m);
    let mut days: BTreeMap<NaiveDate, (i64, f64, i64)> = BTreeMap::new();

    for (created_at, tokens, rub) in rows {
        let Ok(ts) = DateTime::parse_from_rfc3339(created_at) else {
            continue;
        };
        let day = ts.with_timezone(&offset).date_naive();
        if day < from || day > to {
            continue;
        }
        let entry = days.entry(day).or_default();
        entry.0 += tokens.unwrap_or(0);
        entry.1 += rub.unwrap_or(0.0);
        entry.2 += 1;
    }

    days.into_iter()
        .map(|(date, (tokens, rub, count))| DailyPoint {
            date,
            consumption: wants(Metric::Consumption).then_some(tokens),
            to_pay: wants(Metric::ToPay).then_some(rub),
            tz: wants(Metric::Tz).then_some(count),
        })
        .collect()
}
