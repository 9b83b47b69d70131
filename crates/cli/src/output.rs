//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print any response as pretty JSON
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format an optional 0-1 score, dash when the score was not evaluated
pub fn format_score(score: Option<f64>) -> String {
    score.map_or_else(|| "-".to_string(), |s| format!("{:.3}", s))
}

/// Color an optional 0-1 score against the warning/critical bands
pub fn color_score(score: Option<f64>, critical: f64, warning: f64) -> String {
    let formatted = format_score(score);
    match score {
        Some(s) if s < critical => formatted.red().to_string(),
        Some(s) if s < warning => formatted.yellow().to_string(),
        Some(_) => formatted.green().to_string(),
        None => formatted.dimmed().to_string(),
    }
}

/// Format an RFC 3339 timestamp for display
pub fn format_timestamp(ts: &str) -> String {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(ts) {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        ts.to_string()
    }
}

/// Format an optional timestamp, "never" when unset
pub fn format_optional_timestamp(ts: Option<&str>) -> String {
    ts.map_or_else(|| "never".to_string(), format_timestamp)
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "active" | "enabled" | "healthy" | "low" => status.green().to_string(),
        "no_recent_data" | "degraded" | "medium" => status.yellow().to_string(),
        "high" => status.red().to_string(),
        "disabled" | "unhealthy" | "critical" => status.red().bold().to_string(),
        _ => status.to_string(),
    }
}
