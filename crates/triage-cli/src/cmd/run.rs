use crate::cmd::{load_config, print_json};
use anyhow::Context;
use chrono::Utc;
use std::path::Path;
use tracing::warn;
use triage_core::executor::ActionResult;
use triage_core::gitlab::GitlabTracker;
use triage_core::run::{run_triage, ActionRecord, RunOptions, RunSummary};

pub fn run(
    config_path: &Path,
    access_token: Option<String>,
    dry_run: bool,
    json: bool,
) -> anyhow::Result<()> {
    let config = load_config(config_path, access_token)?;
    let warnings = config.ensure_valid().context("config validation failed")?;
    for w in &warnings {
        warn!("config: {}", w.message);
    }

    let tracker = GitlabTracker::from_config(&config).context("failed to create tracker client")?;
    let options = RunOptions {
        dry_run,
        concurrency: config.concurrency,
        now: Utc::now(),
        report_labels: config.report_labels.clone(),
    };
    let summary =
        run_triage(&tracker, &config.policy(), &options).context("triage run failed")?;

    if json {
        return print_json(&summary);
    }
    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    let mode = if summary.dry_run { " (dry run)" } else { "" };
    println!(
        "Project {}: {} open issue(s) checked{mode}",
        summary.project, summary.issues_seen
    );

    let rows: Vec<Vec<String>> = summary
        .decisions
        .iter()
        .filter(|d| !d.actions.is_empty())
        .map(|d| {
            vec![
                d.issue.to_string(),
                d.state.to_string(),
                d.actions
                    .iter()
                    .map(describe)
                    .collect::<Vec<_>>()
                    .join(", "),
                d.title.clone(),
            ]
        })
        .collect();
    if rows.is_empty() {
        println!("No actions.");
    } else {
        print!("\n{}", render_table(&["ISSUE", "STATE", "ACTIONS", "TITLE"], &rows));
    }

    let counts: Vec<Vec<String>> = summary
        .report
        .rows()
        .iter()
        .map(|(label, count)| vec![label.to_string(), count.to_string()])
        .collect();
    print!("\n{}", render_table(&["CATEGORY", "COUNT"], &counts));

    if summary.issues_skipped > 0 || summary.actions_failed > 0 {
        println!(
            "\n{} issue(s) skipped, {} action(s) failed; see the log for details.",
            summary.issues_skipped, summary.actions_failed
        );
    }
    if let Some(error) = &summary.publish_error {
        println!("\nReport was not published: {error}");
    }
    if let Some(report) = &summary.published {
        match &report.url {
            Some(url) => println!("\nReport published as {} ({url})", report.id),
            None => println!("\nReport published as {}", report.id),
        }
    }
}

fn describe(record: &ActionRecord) -> String {
    let outcome = match &record.result {
        ActionResult::Applied { .. } => "done",
        ActionResult::Skipped { .. } => "skipped",
        ActionResult::DryRun { .. } => "planned",
        ActionResult::Failed { .. } => "FAILED",
    };
    format!("{} [{outcome}]", record.action.as_str())
}

/// Left-aligned columns two spaces apart, sized to the widest cell.
fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = table_line(headers.iter().copied(), &widths);
    let rule: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    out.push_str(&format!("{}\n", rule.join("  ")));
    for row in rows {
        out.push_str(&table_line(row.iter().map(String::as_str), &widths));
    }
    out
}

fn table_line<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let padded: Vec<String> = cells
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:width$}"))
        .collect();
    format!("{}\n", padded.join("  ").trim_end())
}
