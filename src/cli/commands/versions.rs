//! Version listing and reporting commands.

use chrono::NaiveDate;
use console::style;

use crate::config::Settings;
use crate::repository::{parse_offset, Metric};

use super::helpers::{
    format_duration_ms, format_opt, format_rub, open_db, styled_status, truncate,
};

/// Show one version.
pub async fn cmd_version(
    settings: &Settings,
    version_id: &str,
    html: bool,
    json: bool,
) -> anyhow::Result<()> {
    let ctx = open_db(settings)?;
    let Some(detail) = ctx.runs().get_version(version_id).await? else {
        anyhow::bail!("version not found: {}", version_id);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }
    if html {
        println!("{}", detail.version.out_html.as_deref().unwrap_or_default());
        return Ok(());
    }

    let v = &detail.version;
    println!(
        "{} {} v{} ({})",
        style("→").cyan(),
        style(&v.spec_name).bold(),
        v.version_number,
        v.id
    );
    println!("  Status:    {}", styled_status(v.status.as_str()));
    if v.status == crate::models::VersionStatus::InProgress {
        println!("  Progress:  {}%", v.progress);
        return Ok(());
    }
    if let Some(code) = &v.failure_code {
        println!(
            "  Failure:   {} {}",
            code,
            v.failure_message.as_deref().unwrap_or_default()
        );
    }
    println!("  Created:   {}", v.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("  Tokens:    {}", format_opt(v.tokens_total));
    println!("  Cost:      {}", format_rub(v.cost_total_rub));
    println!("  Duration:  {}", format_duration_ms(v.inspection_duration_ms));
    println!("  Errors:    {}", format_opt(v.number_of_errors));

    if !detail.invalid_instances.is_empty() {
        println!("\n  {}", style("Invalid instances").bold());
        for stored in &detail.invalid_instances {
            let f = &stored.finding;
            println!(
                "  {:>4} {:<6} {}",
                f.numeric_id,
                f.error_code,
                truncate(&f.quote, 80)
            );
        }
    }
    if !detail.missing_instances.is_empty() {
        println!("\n  {}", style("Missing instances").bold());
        for stored in &detail.missing_instances {
            let f = &stored.finding;
            println!(
                "  {:>4} {:<6} {}",
                f.numeric_id,
                f.error_code,
                truncate(f.suggested_fix.as_deref().unwrap_or("-"), 80)
            );
        }
    }
    Ok(())
}

/// Admin dashboard listing.
pub async fn cmd_versions(settings: &Settings, user: Option<&str>) -> anyhow::Result<()> {
    let ctx = open_db(settings)?;
    let rows = ctx.analytics().admin_dashboard(user).await?;

    if rows.is_empty() {
        println!("{} No versions found", style("!").yellow());
        return Ok(());
    }

    println!(
        "{:<36} {:<30} {:<12} {:>3} {:<12} {:>8} {:>10} {:>6}",
        "Version", "Specification", "User", "#", "Status", "Tokens", "Cost", "Errors"
    );
    println!("{}", "-".repeat(126));
    for r in rows {
        println!(
            "{:<36} {:<30} {:<12} {:>3} {:<12} {:>8} {:>10} {:>6}",
            r.version_id,
            truncate(&r.spec_name, 30),
            truncate(&r.user_id, 12),
            r.version_number,
            styled_status(&r.status),
            format_opt(r.tokens_total),
            format_rub(r.cost_total_rub),
            r.number_of_errors
        );
    }
    Ok(())
}

/// A user's own versions.
pub async fn cmd_versions_me(settings: &Settings, user: &str) -> anyhow::Result<()> {
    let ctx = open_db(settings)?;
    let rows = ctx.analytics().versions_me(user).await?;

    if rows.is_empty() {
        println!("{} No versions for {}", style("!").yellow(), user);
        return Ok(());
    }
    for r in rows {
        println!(
            "{}  {:<30} v{:<3} {}  {}",
            r.created_at.format("%Y-%m-%d %H:%M"),
            truncate(&r.spec_name, 30),
            r.version_number,
            styled_status(&r.status),
            r.version_id
        );
    }
    Ok(())
}

/// Totals over all versions.
pub async fn cmd_stats(settings: &Settings) -> anyhow::Result<()> {
    let ctx = open_db(settings)?;
    let analytics = ctx.analytics();
    let stats = analytics.statistics().await?;

    println!("{}", style("Version statistics").bold());
    println!("  Versions:         {}", stats.total_versions);
    println!("  Tokens:           {}", format_opt(stats.total_tokens));
    println!("  Cost:             {}", format_rub(stats.total_rub));
    println!(
        "  Average duration: {}",
        format_duration_ms(stats.average_duration_ms.map(|v| v.round() as i64))
    );
    match analytics.date_range().await? {
        Some(range) => println!("  Date range:       {} .. {}", range.from, range.to),
        None => println!("  Date range:       -"),
    }
    Ok(())
}

/// Daily analytics between two dates.
pub async fn cmd_analytics(
    settings: &Settings,
    from: NaiveDate,
    to: NaiveDate,
    tz: &str,
    metric_names: &[String],
) -> anyhow::Result<()> {
    if from > to {
        anyhow::bail!("--from must not be after --to");
    }
    let offset = parse_offset(tz).ok_or_else(|| anyhow::anyhow!("invalid UTC offset: {}", tz))?;
    let metrics = metric_names
        .iter()
        .map(|m| Metric::from_str(m).ok_or_else(|| anyhow::anyhow!("unknown metric: {}", m)))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let ctx = open_db(settings)?;
    let points = ctx
        .analytics()
        .daily_analytics(from, to, offset, &metrics)
        .await?;

    if points.is_empty() {
        println!("{} No checks between {} and {}", style("!").yellow(), from, to);
        return Ok(());
    }

    println!(
        "{:<10} {:>12} {:>12} {:>6}",
        "Date", "Tokens", "Cost", "Checks"
    );
    for p in points {
        println!(
            "{:<10} {:>12} {:>12} {:>6}",
            p.date,
            format_opt(p.consumption),
            p.to_pay.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "-".into()),
            format_opt(p.tz)
        );
    }
    Ok(())
}

/// Delete a specification and everything it owns.
pub async fn cmd_delete_spec(settings: &Settings, spec_id: &str, confirm: bool) -> anyhow::Result<()> {
    if !confirm {
        println!(
            "{} This deletes every version, error and instance of {}.",
            style("!").yellow(),
            spec_id
        );
        println!("  Re-run with --confirm to proceed.");
        return Ok(());
    }

    let ctx = open_db(settings)?;
    if ctx.runs().delete_specification(spec_id).await? {
        println!("{} Deleted specification {}", style("✓").green(), spec_id);
        Ok(())
    } else {
        anyhow::bail!("specification not found: {}", spec_id)
    }
}
