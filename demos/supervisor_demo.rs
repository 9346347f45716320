use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use warden::config::{BackoffKind, WatcherSpec};
use warden::process::Supervisor;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    println!("=== Watcher Supervisor Demo ===\n");

    let log_dir = std::env::temp_dir().join("warden-demo-logs");

    // A watcher that crashes immediately and exhausts its restart ceiling
    let crasher = WatcherSpec {
        name: "crasher".to_string(),
        script: PathBuf::from("/bin/sh"),
        interpreter: None,
        args: vec!["-c".to_string(), "echo 'I will crash!'; exit 1".to_string()],
        cwd: None,
        env: HashMap::new(),
        watch: false,
        autorestart: true,
        max_restarts: 3,
        min_uptime: Duration::from_secs(10),
        restart_delay: Duration::from_secs(1),
        backoff: BackoffKind::Exponential,
        max_backoff: Duration::from_secs(8),
        out_file: log_dir.join("crasher-out.log"),
        error_file: log_dir.join("crasher-err.log"),
        log_date_format: Some("YYYY-MM-DD HH:mm:ss".to_string()),
        stop_signal: "SIGTERM".to_string(),
        stop_timeout: Duration::from_secs(2),
    };

    // A stable watcher that just keeps running
    let stable = WatcherSpec {
        name: "stable".to_string(),
        script: PathBuf::from("/bin/sleep"),
        interpreter: None,
        args: vec!["300".to_string()],
        cwd: None,
        env: HashMap::new(),
        watch: false,
        autorestart: true,
        max_restarts: 10,
        min_uptime: Duration::from_secs(2),
        restart_delay: Duration::from_secs(1),
        backoff: BackoffKind::Fixed,
        max_backoff: Duration::from_secs(60),
        out_file: log_dir.join("stable-out.log"),
        error_file: log_dir.join("stable-err.log"),
        log_date_format: None,
        stop_signal: "SIGTERM".to_string(),
        stop_timeout: Duration::from_secs(2),
    };

    println!("Spawning watchers (logs under {})...\n", log_dir.display());

    let (mut supervisor, handle) = Supervisor::with_defaults();
    supervisor.start(vec![crasher, stable]).await?;
    tokio::spawn(supervisor.run());

    // Watch the fleet for a while
    for i in 0..8 {
        tokio::time::sleep(Duration::from_secs(2)).await;

        println!("--- Status #{} ---", i + 1);
        for status in handle.status().await? {
            println!(
                "  {:10} {:10} restarts={} pid={:?}",
                status.name,
                status.state.to_string(),
                status.restarts,
                status.pid
            );
        }
    }

    println!("\nShutting down...");
    let summary = handle.shutdown().await?;
    for status in summary {
        println!("  {:10} {}", status.name, status.state);
    }

    Ok(())
}
