//! Terminal rendering for lint and fix reports.
//!
//! Keeps per-finding lines bounded and readable; JSON output is produced by
//! the CLI directly from the serde report types.

use colored::Colorize;

use crate::core::findings::{FixReport, Level, LintReport, LintResult};

/// Widest message shown per finding line.
pub const MESSAGE_WIDTH: usize = 160;

/// Collapse newlines/extra whitespace and bound length for terminal display.
pub fn compact_line(input: &str, max_chars: usize) -> String {
    let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = collapsed.chars();
    let preview: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", preview)
    } else {
        preview
    }
}

/// Render up to `max_items` messages with compact formatting.
pub fn preview_messages(messages: &[String], max_items: usize, max_chars: usize) -> String {
    if messages.is_empty() {
        return String::new();
    }
    let shown = messages
        .iter()
        .take(max_items)
        .map(|m| compact_line(m, max_chars))
        .collect::<Vec<_>>()
        .join(" | ");
    if messages.len() > max_items {
        format!("{} (+{} more)", shown, messages.len() - max_items)
    } else {
        shown
    }
}

fn level_tag(level: Level) -> colored::ColoredString {
    match level {
        Level::Error => "error".bright_red().bold(),
        Level::Warning => "warn ".bright_yellow().bold(),
        Level::Info => "info ".bright_cyan(),
    }
}

pub fn render_finding(finding: &LintResult) -> String {
    let mut line = format!(
        "  {} {} {}",
        level_tag(finding.level),
        finding.validator.as_str().dimmed(),
        compact_line(&finding.message, MESSAGE_WIDTH)
    );
    if let Some(field) = finding.field() {
        line.push_str(&format!(" {}", format!("[{}]", field).dimmed()));
    }
    if finding.fixed == Some(true) {
        line.push_str(&format!(" {}", "fixed".bright_green()));
    } else if finding.fixable {
        line.push_str(&format!(" {}", "fixable".bright_cyan()));
    }
    line
}

/// Findings grouped under their file, in report order, then the summary.
pub fn render_lint_report(report: &LintReport) -> String {
    let mut out = String::new();
    let mut current: Option<&str> = None;
    for finding in &report.results {
        if current != Some(finding.file_path.as_str()) {
            current = Some(finding.file_path.as_str());
            out.push_str(&format!(
                "{} {} {}\n",
                "▸".bright_cyan(),
                finding.file_path.bright_white().bold(),
                format!("({} '{}')", finding.entity.entity_type, finding.entity.id).dimmed()
            ));
        }
        out.push_str(&render_finding(finding));
        out.push('\n');
    }
    let s = &report.summary;
    let status = if report.has_errors() {
        "✗".bright_red()
    } else {
        "✓".bright_green()
    };
    out.push_str(&format!(
        "{} {} file(s) checked: {} error(s), {} warning(s), {} fixable ({} ms)\n",
        status, s.files_checked, s.errors, s.warnings, s.fixable, s.execution_time
    ));
    out
}

pub fn render_fix_report(report: &FixReport) -> String {
    let mut out = String::new();
    for fix in &report.fixes {
        let mark = if fix.dry_run {
            "~".bright_cyan()
        } else if fix.success {
            "✓".bright_green()
        } else {
            "✗".bright_red()
        };
        out.push_str(&format!(
            "{} {} {} {}\n",
            mark,
            fix.file_path.bright_white(),
            fix.validator.as_str().dimmed(),
            fix.action
        ));
        if let Some(err) = &fix.error {
            out.push_str(&format!("    {} {}\n", "error:".bright_red(), compact_line(err, MESSAGE_WIDTH)));
        }
        if let Some(backup) = &fix.backup_path {
            out.push_str(&format!("    {} {}\n", "backup:".dimmed(), backup));
        }
    }
    let s = &report.summary;
    out.push_str(&format!(
        "{} fixed, {} failed, {} backup(s) created\n",
        s.fixed, s.failed, s.backups_created
    ));
    out
}
