//! Feedback commands.

use console::style;

use crate::config::Settings;
use crate::models::{FeedbackKind, FeedbackUpdate};

use super::helpers::{open_db, truncate};

/// Store feedback on one instance.
pub async fn cmd_feedback(
    settings: &Settings,
    instance_id: String,
    kind: FeedbackKind,
    mark: Option<bool>,
    comment: Option<String>,
    user_id: String,
    is_verification: bool,
) -> anyhow::Result<()> {
    let ctx = open_db(settings)?;
    let update = FeedbackUpdate {
        instance_id,
        kind,
        mark,
        comment,
        user_id,
        is_verification,
    };

    if let Err(e) = ctx.feedback().update_instance_feedback(&update).await {
        eprintln!("{} {} (status {})", style("✗").red(), e, e.http_status());
        return Err(e.into());
    }

    println!(
        "{} Feedback stored on {} instance {}",
        style("✓").green(),
        update.kind.as_str(),
        update.instance_id
    );
    Ok(())
}

/// List stored feedback.
pub async fn cmd_feedbacks(settings: &Settings, user: Option<&str>) -> anyhow::Result<()> {
    let ctx = open_db(settings)?;
    let entries = ctx.feedback().feedbacks(user).await?;

    if entries.is_empty() {
        println!("{} No feedback found", style("!").yellow());
        return Ok(());
    }

    println!(
        "{:<30} {:<8} {:<36} {:<6} {:<6} {:<12} {}",
        "Specification", "Type", "Instance", "Code", "Mark", "User", "Comment"
    );
    println!("{}", "-".repeat(120));
    for e in entries {
        let mark = match e.mark {
            Some(true) => style("yes").green().to_string(),
            Some(false) => style("no").red().to_string(),
            None => "-".to_string(),
        };
        println!(
            "{:<30} {:<8} {:<36} {:<6} {:<6} {:<12} {}",
            truncate(&e.spec_name, 30),
            e.kind.as_str(),
            e.instance_id,
            e.error_code,
            mark,
            truncate(e.user_id.as_deref().unwrap_or("-"), 12),
            truncate(e.comment.as_deref().unwrap_or(""), 40)
        );
    }
    Ok(())
}

/// Resolve a numeric id to its instance UUID.
pub async fn cmd_resolve(
    settings: &Settings,
    numeric_id: i64,
    version_id: Option<&str>,
) -> anyhow::Result<()> {
    let ctx = open_db(settings)?;
    match ctx.feedback().uuid_by_numeric_id(numeric_id, version_id).await? {
        Some(uuid) => {
            println!("{}", uuid);
            Ok(())
        }
        None => anyhow::bail!("no instance with numeric id {}", numeric_id),
    }
}
