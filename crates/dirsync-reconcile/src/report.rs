//! Plain-text plan and summary rendering.

use std::fmt::Write;

use crate::delta::{Action, Change, Delta};
use crate::summary::RunSummary;

fn format_value(value: Option<&crate::model::AttributeValue>) -> String {
    match value {
        Some(v) if !v.is_blank() => format!("\"{v}\""),
        _ => "(empty)".to_string(),
    }
}

fn format_change(change: &Change) -> String {
    let label = if change.is_custom_property {
        format!("{} (custom)", change.field)
    } else {
        change.field.clone()
    };
    format!(
        "{label}: {} -> {}",
        format_value(change.old_value.as_ref()),
        format_value(change.new_value.as_ref())
    )
}

fn write_action(out: &mut String, action: &Action, show_diff: bool) {
    let _ = writeln!(out, "  {} {}", action.kind.symbol(), action.email());
    if show_diff {
        for change in &action.changes {
            let _ = writeln!(out, "      {}", format_change(change));
        }
    }
}

/// Renders the plan. With `show_diff`, every field change is listed under its account.
#[must_use]
pub fn render_plan(delta: &Delta, show_diff: bool) -> String {
    let mut out = String::new();

    if delta.is_empty() {
        let _ = writeln!(
            out,
            "No changes required. {} account(s) already up to date.",
            delta.no_change.len()
        );
    } else {
        let _ = writeln!(out, "Planned changes:");
        for action in delta.create.iter().chain(&delta.update).chain(&delta.delete) {
            write_action(&mut out, action, show_diff);
        }
        let _ = writeln!(
            out,
            "\nPlan: {} to create, {} to update, {} to delete, {} unchanged.",
            delta.create.len(),
            delta.update.len(),
            delta.delete.len(),
            delta.no_change.len()
        );
    }

    if !delta.protected.is_empty() {
        let _ = writeln!(out, "\nProtected from deletion:");
        for account in &delta.protected {
            let _ = writeln!(out, "  ! {} ({})", account.email, account.reason);
        }
    }

    out
}

/// Renders the final summary with failures and warnings.
#[must_use]
pub fn render_summary(summary: &RunSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Summary: {summary}");
    if summary.managers_assigned > 0 || summary.managers_cleared > 0 {
        let _ = writeln!(
            out,
            "Managers: {} assigned, {} cleared",
            summary.managers_assigned, summary.managers_cleared
        );
    }
    if summary.skipped > 0 {
        let _ = writeln!(out, "Skipped: {}", summary.skipped);
    }
    if !summary.failures.is_empty() {
        let _ = writeln!(out, "\nFailures:");
        for failure in &summary.failures {
            let _ = writeln!(
                out,
                "  ✗ {} {}: {}",
                failure.operation, failure.email, failure.error
            );
        }
    }
    if !summary.warnings.is_empty() {
        let _ = writeln!(out, "\nWarnings:");
        for warning in &summary.warnings {
            let _ = writeln!(out, "  ! {warning}");
        }
    }
    out
}
