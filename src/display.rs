//! Colored CLI output for the knowledge server.

use std::io::{self, Write};

use owo_colors::OwoColorize;

use crate::config::ServerConfig;
use crate::store::{FeatureSummary, HealthReport, KnowledgeEntry};

/// Maximum length for truncated display strings.
const DEFAULT_MAX_LEN: usize = 80;

/// Truncate a string to a maximum number of characters, adding ellipsis if truncated.
#[must_use]
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{head}...")
    }
}

/// Print the startup banner.
pub fn print_banner(config: &ServerConfig) {
    let rule = "=".repeat(60);
    println!("{}", rule.dimmed());
    println!("{}", "Agent Knowledge Server".bold());
    println!("{}", rule.dimmed());
    println!("  {} http://{}", "Server:".blue().bold(), config.address());
    println!(
        "  {} {}",
        "Database:".blue().bold(),
        config.db_path.display()
    );
    println!(
        "  {} curl http://localhost:{}/health",
        "Try:".blue().bold(),
        config.port
    );
    println!("{}", rule.dimmed());
    let _ = io::stdout().flush();
}

/// Print the result of a health probe.
pub fn print_health(report: &HealthReport) {
    match report {
        HealthReport::Healthy(stats) => {
            println!(
                "{} entries={} features={} agents={}",
                "[HEALTHY]".green().bold(),
                stats.total_entries.cyan(),
                stats.total_features.cyan(),
                stats.total_agents.cyan()
            );
        }
        HealthReport::Unhealthy { error } => {
            println!("{} {}", "[UNHEALTHY]".red().bold(), error.red());
        }
    }
    let _ = io::stdout().flush();
}

/// Print one line per feature, most recently active first.
pub fn print_features(features: &[FeatureSummary]) {
    if features.is_empty() {
        println!("{}", "No features recorded".dimmed());
    }
    for feature in features {
        println!(
            "{} {} entries, last update {} by {}",
            feature.feature.cyan().bold(),
            feature.entry_count,
            feature.latest_update.format("%Y-%m-%d %H:%M:%S").dimmed(),
            feature.contributing_agents.join(", ")
        );
    }
    let _ = io::stdout().flush();
}

/// Print entries, newest first.
pub fn print_entries(entries: &[KnowledgeEntry]) {
    if entries.is_empty() {
        println!("{}", "No entries".dimmed());
    }
    for entry in entries {
        let branch = entry
            .branch
            .as_deref()
            .map(|b| format!(" ({b})"))
            .unwrap_or_default();
        println!(
            "{} {} {}{} {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S").dimmed(),
            format!("#{}", entry.id).yellow(),
            format!("[{}/{}]", entry.feature, entry.agent).blue().bold(),
            branch.dimmed(),
            truncate(&entry.summary, DEFAULT_MAX_LEN)
        );
    }
    let _ = io::stdout().flush();
}

/// Print an error message.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "[ERROR]".red().bold(), message.red());
}
