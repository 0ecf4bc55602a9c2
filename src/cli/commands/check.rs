//! Check command: runs the whole pipeline on one document.

use std::path::{Path, PathBuf};
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use crate::config::Settings;
use crate::pipeline::{CheckRequest, PipelineEvent};
use crate::service::TzService;

use super::helpers::{format_duration_ms, format_opt, format_rub, truncate};

pub struct CheckOptions {
    pub out: Option<PathBuf>,
    pub audit: Option<PathBuf>,
    pub gg_id: Option<i64>,
    pub use_cache: bool,
    pub json: bool,
}

/// Check a DOCX file and print a summary.
pub async fn cmd_check(
    settings: &Settings,
    file: &Path,
    user: &str,
    opts: CheckOptions,
) -> anyhow::Result<()> {
    let data = tokio::fs::read(file).await?;
    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.docx".to_string());

    settings.ensure_directories()?;
    let service = TzService::from_settings(settings)?;
    service.db().init_schema().await?;

    if let Some(gg_id) = opts.gg_id {
        service.coordinator().set_gg_id(gg_id);
    }
    if opts.use_cache {
        service.coordinator().set_use_llm_cache(true);
    }

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% {msg}")?
            .progress_chars("#>-"),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message(truncate(&filename, 40));

    let (tx, mut rx) = mpsc::channel::<PipelineEvent>(64);
    let bar = pb.clone();
    let renderer = tokio::spawn(async move {
        let (mut done, mut failed) = (0usize, 0usize);
        while let Some(event) = rx.recv().await {
            match event {
                PipelineEvent::StepCompleted { state, progress } => {
                    bar.set_position(progress as u64);
                    bar.set_message(state.as_str());
                }
                PipelineEvent::LlmTaskFinished { ok, .. } => {
                    if ok {
                        done += 1;
                    } else {
                        failed += 1;
                    }
                    bar.set_message(format!("LLM: {} done, {} failed", done, failed));
                }
                PipelineEvent::Failed { code } => bar.abandon_with_message(code),
            }
        }
    });

    let request = CheckRequest {
        file: data,
        filename,
        user_id: user.to_string(),
    };
    let cancel = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let outcome = service.check_tz_until(&request, Some(tx), cancel).await;
    let _ = renderer.await;

    let result = match outcome {
        Ok(result) => {
            pb.finish_and_clear();
            result
        }
        Err(e) => {
            eprintln!(
                "{} Check failed [{}]: {}",
                style("✗").red(),
                e.code(),
                e
            );
            anyhow::bail!("check failed with status {}", e.http_status());
        }
    };

    if let Some(out) = &opts.out {
        let html = if result.css.is_empty() {
            result.out_html.clone()
        } else {
            format!("<style>\n{}\n</style>\n{}", result.css, result.out_html)
        };
        tokio::fs::write(out, html).await?;
    }
    if let Some(audit) = &opts.audit {
        tokio::fs::write(audit, result.audit_tsv()).await?;
    }

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    let wrapped = result
        .audit
        .iter()
        .filter(|e| e.status == crate::annotate::audit::AuditStatus::Found)
        .count();
    println!(
        "{} Checked {} (version {}, #{})",
        style("✓").green(),
        style(&request.filename).bold(),
        result.version_id,
        result.version_number
    );
    println!("  Error groups:      {}", result.errors.len());
    println!(
        "  Invalid instances: {} ({} located in the document)",
        result.invalid_instances.len(),
        wrapped
    );
    println!("  Missing instances: {}", result.missing_instances.len());
    println!("  Tokens:            {}", format_opt(result.tokens_total));
    println!("  Cost:              {}", format_rub(result.cost_total_rub));
    println!(
        "  Duration:          {}",
        format_duration_ms(Some(result.inspection_duration_ms as i64))
    );
    if let Some(key) = &result.report_file_id {
        println!("  Report:            {}", settings.storage_root.join(key).display());
    }
    if let Some(out) = &opts.out {
        println!("  Annotated HTML:    {}", out.display());
    }

    Ok(())
}
