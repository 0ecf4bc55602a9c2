//! LLM response cache commands.

use console::style;

use crate::config::Settings;

use super::helpers::open_db;

pub async fn cmd_cache_stats(settings: &Settings) -> anyhow::Result<()> {
    let ctx = open_db(settings)?;
    let count = ctx.llm_cache().count().await?;
    println!("{} {} cached LLM responses", style("→").cyan(), count);
    Ok(())
}

/// Delete every cached LLM response.
pub async fn cmd_cache_purge(settings: &Settings) -> anyhow::Result<()> {
    let ctx = open_db(settings)?;
    let removed = ctx.llm_cache().purge().await?;
    println!(
        "{} Removed {} cached LLM responses",
        style("✓").green(),
        removed
    );
    Ok(())
}
