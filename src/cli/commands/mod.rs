//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod cache;
mod check;
mod feedback;
mod helpers;
mod init;
mod versions;

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use crate::config::Settings;
use crate::models::FeedbackKind;

#[derive(Parser)]
#[command(name = "tzcheck")]
#[command(about = "Defect annotation for technical-specification documents")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory (overrides config file)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

/// Instance table selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum KindArg {
    Invalid,
    Missing,
}

impl From<KindArg> for FeedbackKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Invalid => FeedbackKind::Invalid,
            KindArg::Missing => FeedbackKind::Missing,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and database
    Init,

    /// Check a DOCX document and store the annotated result
    Check {
        /// Document to check
        file: PathBuf,
        /// User the check is recorded for
        #[arg(short, long)]
        user: String,
        /// Write the annotated HTML here
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Write the localisation audit (TSV) here
        #[arg(long)]
        audit: Option<PathBuf>,
        /// Prompt-group set to request (overrides config)
        #[arg(long)]
        gg_id: Option<i64>,
        /// Answer prompts from the LLM response cache
        #[arg(long)]
        use_cache: bool,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a stored version
    Version {
        /// Version ID
        version_id: String,
        /// Print the annotated HTML instead of a summary
        #[arg(long)]
        html: bool,
        /// Print the full version as JSON
        #[arg(long)]
        json: bool,
    },

    /// Leave feedback on a finding
    Feedback {
        /// Instance UUID
        instance_id: String,
        /// Instance type
        #[arg(short, long, value_enum)]
        kind: KindArg,
        /// Whether the finding is correct
        #[arg(long)]
        mark: Option<bool>,
        /// Free-text comment (required with --mark false)
        #[arg(long)]
        comment: Option<String>,
        /// Reviewer user ID
        #[arg(short, long)]
        user: String,
        /// Store as verification feedback
        #[arg(long)]
        verification: bool,
    },

    /// List versions (admin dashboard)
    Versions {
        /// Only versions of this user
        #[arg(long)]
        user: Option<String>,
        /// List a user's own versions instead of the dashboard
        #[arg(long, conflicts_with = "user")]
        me: Option<String>,
    },

    /// Show usage statistics and the date range of checks
    Stats,

    /// Daily usage analytics
    Analytics {
        /// First day (YYYY-MM-DD)
        #[arg(long)]
        from: NaiveDate,
        /// Last day (YYYY-MM-DD)
        #[arg(long)]
        to: NaiveDate,
        /// UTC offset the days are counted in
        #[arg(long, default_value = "+03:00", allow_hyphen_values = true)]
        tz: String,
        /// Metrics to show: consumption, toPay, tz (default: all)
        #[arg(long = "metric")]
        metrics: Vec<String>,
    },

    /// List stored feedback
    Feedbacks {
        /// Only feedback left by this user
        #[arg(long)]
        user: Option<String>,
    },

    /// Resolve a numeric error id to its instance UUID
    Resolve {
        /// Numeric id as shown in `error-id`
        numeric_id: i64,
        /// Version the id belongs to (default: most recent match)
        #[arg(long)]
        version: Option<String>,
    },

    /// Manage the LLM response cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// Delete a specification with all its versions
    DeleteSpec {
        /// Specification ID
        spec_id: String,
        /// Skip confirmation prompt
        #[arg(long)]
        confirm: bool,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Show the number of cached responses
    Stats,
    /// Delete every cached response
    Purge,
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir {
        settings.storage_root = data_dir.join("objects");
        settings.data_dir = data_dir;
    }

    match cli.command {
        Commands::Init => init::cmd_init(&settings).await,
        Commands::Check {
            file,
            user,
            out,
            audit,
            gg_id,
            use_cache,
            json,
        } => {
            let opts = check::CheckOptions {
                out,
                audit,
                gg_id,
                use_cache,
                json,
            };
            check::cmd_check(&settings, &file, &user, opts).await
        }
        Commands::Version {
            version_id,
            html,
            json,
        } => versions::cmd_version(&settings, &version_id, html, json).await,
        Commands::Feedback {
            instance_id,
            kind,
            mark,
            comment,
            user,
            verification,
        } => {
            feedback::cmd_feedback(
                &settings,
                instance_id,
                kind.into(),
                mark,
                comment,
                user,
                verification,
            )
            .await
        }
        Commands::Versions { user, me } => match me {
            Some(me) => versions::cmd_versions_me(&settings, &me).await,
            None => versions::cmd_versions(&settings, user.as_deref()).await,
        },
        Commands::Stats => versions::cmd_stats(&settings).await,
        Commands::Analytics {
            from,
            to,
            tz,
            metrics,
        } => versions::cmd_analytics(&settings, from, to, &tz, &metrics).await,
        Commands::Feedbacks { user } => feedback::cmd_feedbacks(&settings, user.as_deref()).await,
        Commands::Resolve {
            numeric_id,
            version,
        } => feedback::cmd_resolve(&settings, numeric_id, version.as_deref()).await,
        Commands::Cache { command } => match command {
            CacheCommands::Stats => cache::cmd_cache_stats(&settings).await,
            CacheCommands::Purge => cache::cmd_cache_purge(&settings).await,
        },
        Commands::DeleteSpec { spec_id, confirm } => {
            versions::cmd_delete_spec(&settings, &spec_id, confirm).await
        }
    }
}
