//! Terminal output for plans and run summaries

use dirsync_reconcile::{render_plan, render_summary, Delta, RunPhase, RunReport, RunSummary};
use serde::Serialize;
use std::fmt::Write;
use uuid::Uuid;

use crate::error::CliResult;

/// Check if color output is enabled
fn use_color() -> bool {
    std::env::var("NO_COLOR").is_err()
}

/// Print a success message (green checkmark)
pub fn print_success(message: &str) {
    if use_color() {
        println!("\x1b[32m✓\x1b[0m {}", message);
    } else {
        println!("OK: {}", message);
    }
}

/// Print a warning message (yellow)
pub fn print_warning(message: &str) {
    if use_color() {
        eprintln!("\x1b[33mWarning:\x1b[0m {}", message);
    } else {
        eprintln!("Warning: {}", message);
    }
}

/// Human-readable report for a finished run.
pub fn render_report(report: &RunReport, show_diff: bool) -> String {
    let mut out = String::new();

    match report.phase {
        RunPhase::Reported => {
            let _ = writeln!(out, "Dry run: no changes were applied.\n");
            out.push_str(&render_plan(&report.delta, show_diff));
        }
        RunPhase::AwaitingConfirmation => {
            out.push_str(&render_plan(&report.delta, show_diff));
            let _ = writeln!(
                out,
                "\n{} account(s) would be deleted:",
                report.delta.delete.len()
            );
            for action in &report.delta.delete {
                let _ = writeln!(out, "  - {}", action.email());
            }
            let _ = writeln!(
                out,
                "\nNothing was changed. Re-run with --force to apply these deletions, or with --skip-delete to apply everything else."
            );
        }
        _ => {
            out.push_str(&render_plan(&report.delta, show_diff));
            if let Some(summary) = &report.summary {
                out.push('\n');
                out.push_str(&render_summary(summary));
            }
        }
    }

    // A summary already carries the planning warnings.
    if report.summary.is_none() && !report.warnings.is_empty() {
        let _ = writeln!(out, "\nPlanning warnings:");
        for warning in &report.warnings {
            let _ = writeln!(out, "  ! {warning}");
        }
    }

    out
}

#[derive(Serialize)]
struct JsonReport<'a> {
    run_id: Uuid,
    phase: RunPhase,
    delta: &'a Delta,
    warnings: &'a [String],
    summary: Option<&'a RunSummary>,
}

/// Machine-readable report for `--json`.
pub fn render_json(report: &RunReport) -> CliResult<String> {
    let json = JsonReport {
        run_id: report.run_id,
        phase: report.phase,
        delta: &report.delta,
        warnings: &report.warnings,
        summary: report.summary.as_ref(),
    };
    Ok(serde_json::to_string_pretty(&json)?)
}
