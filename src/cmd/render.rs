//! Terminal rendering for builds and timeline lines.

use console::{StyledObject, style};
use kiln_common::{Build, BuildStatus, LogLevel, LogLine};

fn paint<D>(status: BuildStatus, value: D) -> StyledObject<D> {
    let styled = style(value);
    match status {
        BuildStatus::Pending => styled.dim(),
        BuildStatus::Running => styled.cyan(),
        BuildStatus::Succeeded => styled.green(),
        BuildStatus::Failed => styled.red().bold(),
    }
}

pub fn styled_status(status: BuildStatus) -> StyledObject<&'static str> {
    paint(status, status.as_str())
}

fn styled_message(line: &LogLine) -> StyledObject<&str> {
    let text = line.message.as_str();
    match line.level {
        LogLevel::Info => style(text),
        LogLevel::Warning => style(text).yellow(),
        LogLevel::Error => style(text).red(),
        LogLevel::Success => style(text).green(),
    }
}

pub fn print_line(line: &LogLine) {
    println!(
        "{} {}",
        style(line.timestamp.format("%H:%M:%S")).dim(),
        styled_message(line)
    );
}

/// A failed status refresh; whatever follows uses the store's last known status.
pub fn print_stale_status_warning(error: &impl std::fmt::Display) {
    println!(
        "{} {} (showing last known status)",
        style("Warning:").yellow().bold(),
        error
    );
}

pub fn print_build_header() {
    println!(
        "{:<24} {:<10} {:<10} {:<14} Message",
        "Build", "Commit", "Status", "Duration"
    );
    println!(
        "{:<24} {:<10} {:<10} {:<14} -------",
        "------------------------", "----------", "----------", "--------------"
    );
}

pub fn print_build_row(build: &Build) {
    let short: String = build.commit_hash.chars().take(7).collect();
    // Pad before styling; escape codes would break the column width.
    let status = paint(build.status(), format!("{:<10}", build.status().as_str()));
    println!(
        "{:<24} {:<10} {} {:<14} {}",
        build.id.as_str(),
        short,
        status,
        build.duration(),
        build.commit_message.lines().next().unwrap_or("")
    );
}
