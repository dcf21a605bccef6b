//! Display formatting for CLI output
//!
//! Tables are laid out on plain text first so column widths are not thrown
//! off by terminal escape codes; styling is applied per cell afterwards.

use chrono::{DateTime, Local, Utc};
use console::{StyledObject, style};
use indicatif::{ProgressBar, ProgressStyle};
use rudder_kube::{ChangeType, Hook, Release, ReleaseDiff, Status};
use std::time::Duration;

/// Color a status the same way everywhere
pub fn status_style(status: Status) -> StyledObject<&'static str> {
    let s = style(status.as_str());
    match status {
        Status::Deployed => s.green(),
        Status::Failed => s.red(),
        Status::Superseded | Status::Deleted | Status::Unknown => s.dim(),
        _ => s.yellow(),
    }
}

pub fn success(message: impl std::fmt::Display) {
    println!("{} {}", style("✓").green().bold(), message);
}

pub fn step(message: impl std::fmt::Display) {
    println!("{} {}", style("→").blue().bold(), message);
}

pub fn warn(message: impl std::fmt::Display) {
    eprintln!("{} {}", style("⚠").yellow().bold(), message);
}

/// Spinner shown on stderr while a transition runs
pub fn spinner(message: impl Into<String>) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::with_template("{spinner:.blue} {msg}") {
        pb.set_style(template.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "));
    }
    pb.set_message(message.into());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

pub fn print_notes(release: &Release) {
    if let Some(notes) = release.notes.as_deref().filter(|n| !n.trim().is_empty()) {
        println!("\n{}", style("NOTES:").bold());
        println!("{}", notes.trim_end());
    }
}

pub fn format_time(time: DateTime<Utc>) -> String {
    time.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

fn updated(release: &Release) -> String {
    format_time(release.info.last_modified)
}

/// Column-aligned table; the last column is never padded
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let line = |cells: Vec<&str>| -> String {
        let last = cells.len().saturating_sub(1);
        cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                if i == last {
                    cell.to_string()
                } else {
                    format!("{:<width$}", cell, width = widths[i])
                }
            })
            .collect::<Vec<_>>()
            .join("  ")
    };

    let mut out = line(headers.to_vec());
    for row in rows {
        out.push('\n');
        out.push_str(&line(row.iter().map(String::as_str).collect()));
    }
    out
}

pub fn history_rows(history: &[Release]) -> Vec<Vec<String>> {
    history
        .iter()
        .map(|r| {
            vec![
                r.version.to_string(),
                updated(r),
                r.status().to_string(),
                r.chart.reference(),
                r.chart.app_version.clone().unwrap_or_default(),
                r.info.description.clone(),
            ]
        })
        .collect()
}

pub fn list_rows(releases: &[Release]) -> Vec<Vec<String>> {
    releases
        .iter()
        .map(|r| {
            vec![
                r.name.clone(),
                r.namespace.clone(),
                r.version.to_string(),
                updated(r),
                r.status().to_string(),
                r.chart.reference(),
                r.chart.app_version.clone().unwrap_or_default(),
            ]
        })
        .collect()
}

pub const HISTORY_HEADERS: &[&str] = &[
    "REVISION",
    "UPDATED",
    "STATUS",
    "CHART",
    "APP VERSION",
    "DESCRIPTION",
];

pub const LIST_HEADERS: &[&str] = &[
    "NAME",
    "NAMESPACE",
    "REVISION",
    "UPDATED",
    "STATUS",
    "CHART",
    "APP VERSION",
];

/// Print a table, bolding the header line
pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    let table = render_table(headers, rows);
    let mut lines = table.lines();
    if let Some(header) = lines.next() {
        println!("{}", style(header).bold());
    }
    for line in lines {
        println!("{}", line);
    }
}

pub fn print_release_info(release: &Release) {
    println!("NAME: {}", style(&release.name).cyan());
    println!("NAMESPACE: {}", style(&release.namespace).yellow());
    if let Some(deployed) = release.info.last_deployed {
        println!("LAST DEPLOYED: {}", format_time(deployed));
    }
    println!("STATUS: {}", status_style(release.status()));
    println!("REVISION: {}", release.version);
    println!("CHART: {}", release.chart.reference());
    if !release.info.description.is_empty() {
        println!("DESCRIPTION: {}", release.info.description);
    }
    if release.is_stuck() {
        warn(format!(
            "release has been {} since {}; run `rudder recover {}` if no operation is running",
            release.status(),
            format_time(release.info.last_modified),
            release.name
        ));
    }
}

pub fn print_hooks(hooks: &[Hook]) {
    if hooks.is_empty() {
        return;
    }
    println!("\n{}", style("HOOKS:").bold());
    for hook in hooks {
        let events: Vec<&str> = hook.events.iter().map(|e| e.as_str()).collect();
        let phase = hook
            .last_run
            .as_ref()
            .map(|run| run.phase.to_string())
            .unwrap_or_else(|| "not run".to_string());
        println!(
            "  {}/{} [{}] weight {}: {}",
            hook.kind,
            hook.name,
            events.join(","),
            hook.weight,
            phase
        );
    }
}

pub fn print_diff(diff: &ReleaseDiff, with_content: bool) {
    if !diff.has_changes() {
        println!("{}", style("No changes").dim());
        return;
    }
    for change in &diff.changes {
        let (marker, name) = match change.change_type {
            ChangeType::Added => (style("+").green().bold(), style(change.display_name()).green()),
            ChangeType::Removed => (style("-").red().bold(), style(change.display_name()).red()),
            ChangeType::Modified => (style("~").yellow().bold(), style(change.display_name()).yellow()),
        };
        println!("{} {}", marker, name);
        if with_content {
            for line in change.diff.lines() {
                if line.starts_with('+') {
                    println!("    {}", style(line).green());
                } else if line.starts_with('-') {
                    println!("    {}", style(line).red());
                } else {
                    println!("    {}", line);
                }
            }
        }
    }
    println!("\n{}", style(diff.summary()).bold());
}
