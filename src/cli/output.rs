// Output formatting and display for CLI

use crate::config::WatcherSpec;
use crate::process::{LifecycleState, WatcherStatus};
use colored::*;
use std::time::Duration;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Print a success message
pub fn print_success_msg(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a formatted table of watcher statuses
pub fn print_status_table(statuses: &[WatcherStatus]) {
    #[derive(Tabled)]
    struct StatusRow {
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "State")]
        state: String,
        #[tabled(rename = "PID")]
        pid: String,
        #[tabled(rename = "Restarts")]
        restarts: String,
        #[tabled(rename = "Uptime")]
        uptime: String,
        #[tabled(rename = "CPU")]
        cpu: String,
        #[tabled(rename = "Memory")]
        memory: String,
        #[tabled(rename = "Last exit")]
        last_exit: String,
    }

    let rows: Vec<StatusRow> = statuses
        .iter()
        .map(|s| StatusRow {
            name: truncate(&s.name, 20),
            state: format_state_colored(&s.state),
            pid: s.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
            restarts: s.restarts.to_string(),
            uptime: s
                .uptime
                .map(format_duration)
                .unwrap_or_else(|| "-".to_string()),
            cpu: format!("{:.1}%", s.cpu_usage),
            memory: format_memory(s.memory_bytes),
            last_exit: s.last_exit.clone().unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    let mut table = Table::new(rows);
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()));

    println!("{}", table);
}

/// Print a formatted table of parsed watcher specs (used by `check`)
pub fn print_spec_table(specs: &[WatcherSpec]) {
    #[derive(Tabled)]
    struct SpecRow {
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Script")]
        script: String,
        #[tabled(rename = "Interpreter")]
        interpreter: String,
        #[tabled(rename = "Autorestart")]
        autorestart: String,
        #[tabled(rename = "Max restarts")]
        max_restarts: String,
        #[tabled(rename = "Min uptime")]
        min_uptime: String,
        #[tabled(rename = "Out file")]
        out_file: String,
    }

    let rows: Vec<SpecRow> = specs
        .iter()
        .map(|s| SpecRow {
            name: truncate(&s.name, 20),
            script: truncate(&s.script.display().to_string(), 32),
            interpreter: s.interpreter.clone().unwrap_or_else(|| "-".to_string()),
            autorestart: if s.autorestart { "yes" } else { "no" }.to_string(),
            max_restarts: s.max_restarts.to_string(),
            min_uptime: format_duration(s.min_uptime),
            out_file: truncate(&s.out_file.display().to_string(), 32),
        })
        .collect();

    let mut table = Table::new(rows);
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()));

    println!("{}", table);
}

fn format_state_colored(state: &LifecycleState) -> String {
    match state {
        LifecycleState::Running => state.to_string().green().to_string(),
        LifecycleState::Starting | LifecycleState::Restarting => {
            state.to_string().yellow().to_string()
        }
        LifecycleState::Stopped | LifecycleState::Exited => {
            state.to_string().dimmed().to_string()
        }
        LifecycleState::Crashed | LifecycleState::Failed => {
            state.to_string().red().bold().to_string()
        }
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

fn format_memory(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}…", &s[..max.saturating_sub(1)])
    }
}
