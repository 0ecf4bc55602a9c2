//! Initialize command.

use console::style;

use crate::config::Settings;

/// Initialize the data directory and database.
pub async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    settings.ensure_directories()?;

    let ctx = settings.create_db_context();
    ctx.init_schema().await?;

    println!(
        "{} Initialized tzcheck in {}",
        style("✓").green(),
        settings.data_dir.display()
    );
    println!("  Database: {}", settings.database_url());
    println!("  Objects:  {}", settings.storage_root.display());

    if settings.services.report_generator_url.is_none() {
        println!(
            "{} No report generator configured; DOCX reports will be skipped",
            style("!").yellow()
        );
    }

    Ok(())
}
