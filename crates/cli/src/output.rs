//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table, or "nothing to show" when empty
pub fn print_table<T: Tabled>(items: &[T], empty: &str) {
    if items.is_empty() {
        println!("{}", empty.yellow());
        return;
    }
    let table = Table::new(items).with(Style::rounded()).to_string();
    println!("{}", table);
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Usage over limit as a percentage, `-` when unknown
pub fn format_ratio(ratio: Option<f64>) -> String {
    match ratio {
        Some(ratio) => format!("{:.0}%", ratio * 100.0),
        None => "-".to_string(),
    }
}

/// Utilization colored by how close it is to the limit
pub fn color_ratio(ratio: Option<f64>) -> String {
    let formatted = format_ratio(ratio);
    match ratio {
        Some(r) if r >= 0.9 => formatted.red().to_string(),
        Some(r) if r >= 0.7 => formatted.yellow().to_string(),
        Some(_) => formatted.green().to_string(),
        None => formatted.dimmed().to_string(),
    }
}

/// Color a pod phase or deployment state
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "running" | "succeeded" | "ready" => status.green().to_string(),
        "pending" | "stopped" | "scaling" => status.yellow().to_string(),
        "failed" | "unknown" => status.red().to_string(),
        _ => status.to_string(),
    }
}
