//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
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

/// Format a memory target in MB
pub fn format_memory_mb(mb: i32) -> String {
    if mb >= 1024 {
        format!("{:.2}Gi", mb as f64 / 1024.0)
    } else {
        format!("{}Mi", mb)
    }
}

/// Format a CPU target percentage
pub fn format_percent(percent: i32) -> String {
    format!("{}%", percent)
}

/// Color an agent's stressing state
pub fn color_active(active: bool) -> String {
    if active {
        "active".green().to_string()
    } else {
        "stopped".yellow().to_string()
    }
}
