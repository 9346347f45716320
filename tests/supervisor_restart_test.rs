// Integration tests for supervisor restart behavior with real children

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use warden::config::{BackoffKind, WatcherSpec};
use warden::process::{LifecycleState, Supervisor, SupervisorHandle, WatcherStatus};

fn shell_spec(name: &str, dir: &std::path::Path, command: &str) -> WatcherSpec {
    WatcherSpec {
        name: name.to_string(),
        script: PathBuf::from("/bin/sh"),
        interpreter: None,
        args: vec!["-c".to_string(), command.to_string()],
        cwd: None,
        env: HashMap::new(),
        watch: false,
        autorestart: true,
        max_restarts: 10,
        min_uptime: Duration::from_secs(10),
        restart_delay: Duration::from_millis(10),
        backoff: BackoffKind::Fixed,
        max_backoff: Duration::from_secs(60),
        out_file: dir.join(format!("{}-out.log", name)),
        error_file: dir.join(format!("{}-err.log", name)),
        log_date_format: None,
        stop_signal: "SIGTERM".to_string(),
        stop_timeout: Duration::from_millis(200),
    }
}

async fn status_of(handle: &SupervisorHandle, name: &str) -> WatcherStatus {
    handle
        .status()
        .await
        .unwrap()
        .into_iter()
        .find(|s| s.name == name)
        .expect("watcher missing from status")
}

async fn wait_for_state(
    handle: &SupervisorHandle,
    name: &str,
    state: LifecycleState,
    timeout: Duration,
) -> WatcherStatus {
    let deadline = Instant::now() + timeout;
    loop {
        let status = status_of(handle, name).await;
        if status.state == state {
            return status;
        }
        if Instant::now() > deadline {
            panic!(
                "watcher '{}' never reached {:?}; last status: {:?}",
                name, state, status
            );
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

#[tokio::test]
async fn crash_loop_exhausts_restart_ceiling() {
    let temp = TempDir::new().unwrap();
    let mut spec = shell_spec("crash-loop", temp.path(), "exit 1");
    spec.max_restarts = 3;

    let (mut supervisor, handle) = Supervisor::with_defaults();
    supervisor.start(vec![spec]).await.unwrap();
    tokio::spawn(supervisor.run());

    let status = wait_for_state(
        &handle,
        "crash-loop",
        LifecycleState::Failed,
        Duration::from_secs(5),
    )
    .await;

    // The ceiling bounds the counter, and the failed watcher stays listed
    assert_eq!(status.restarts, 3);
    assert!(status.pid.is_none());
    assert_eq!(status.last_exit.as_deref(), Some("exit 1"));

    let _ = handle.shutdown().await;
}

#[tokio::test]
async fn eleven_immediate_crashes_yield_ten_respawns() {
    let temp = TempDir::new().unwrap();
    let mut spec = shell_spec("pm-scenario", temp.path(), "exit 1");
    spec.max_restarts = 10;
    spec.restart_delay = Duration::from_millis(5);

    let (mut supervisor, handle) = Supervisor::with_defaults();
    supervisor.start(vec![spec]).await.unwrap();
    tokio::spawn(supervisor.run());

    let status = wait_for_state(
        &handle,
        "pm-scenario",
        LifecycleState::Failed,
        Duration::from_secs(10),
    )
    .await;

    // 1 initial spawn + 10 respawns; the 11th crash fails the watcher
    assert_eq!(status.restarts, 10);

    // No 12th spawn attempt after settling
    tokio::time::sleep(Duration::from_millis(200)).await;
    let after = status_of(&handle, "pm-scenario").await;
    assert_eq!(after.state, LifecycleState::Failed);
    assert!(after.pid.is_none());

    let _ = handle.shutdown().await;
}

#[tokio::test]
async fn stable_runs_never_exhaust_the_ceiling() {
    let temp = TempDir::new().unwrap();
    let mut spec = shell_spec("stable-crasher", temp.path(), "sleep 0.3; exit 1");
    spec.max_restarts = 2;
    spec.min_uptime = Duration::from_millis(50);

    let (mut supervisor, handle) = Supervisor::with_defaults();
    supervisor.start(vec![spec]).await.unwrap();
    tokio::spawn(supervisor.run());

    // Each run stays up well past min_uptime, so every crash evaluation
    // starts from a reset counter and the watcher outlives many more
    // crashes than max_restarts would otherwise allow.
    let deadline = Instant::now() + Duration::from_millis(1800);
    while Instant::now() < deadline {
        let status = status_of(&handle, "stable-crasher").await;
        assert_ne!(
            status.state,
            LifecycleState::Failed,
            "stable watcher must not exhaust restarts"
        );
        assert!(status.restarts <= 1, "counter must reset after stable runs");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let _ = handle.shutdown().await;
}

#[tokio::test]
async fn stop_cancels_pending_restart() {
    let temp = TempDir::new().unwrap();
    let mut spec = shell_spec("pending", temp.path(), "exit 1");
    spec.restart_delay = Duration::from_millis(500);

    let (mut supervisor, handle) = Supervisor::with_defaults();
    supervisor.start(vec![spec]).await.unwrap();
    tokio::spawn(supervisor.run());

    wait_for_state(
        &handle,
        "pending",
        LifecycleState::Restarting,
        Duration::from_secs(5),
    )
    .await;

    handle.stop("pending").await.unwrap();

    // Let the restart timer fire into the void
    tokio::time::sleep(Duration::from_millis(700)).await;
    let status = status_of(&handle, "pending").await;
    assert_eq!(status.state, LifecycleState::Stopped);
    assert!(status.pid.is_none());
    assert_eq!(status.restarts, 1);

    let _ = handle.shutdown().await;
}

#[tokio::test]
async fn stop_running_watcher_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let spec = shell_spec("long-runner", temp.path(), "sleep 30");

    let (mut supervisor, handle) = Supervisor::with_defaults();
    supervisor.start(vec![spec]).await.unwrap();
    tokio::spawn(supervisor.run());

    handle.stop("long-runner").await.unwrap();
    handle.stop("long-runner").await.unwrap();

    let status = wait_for_state(
        &handle,
        "long-runner",
        LifecycleState::Stopped,
        Duration::from_secs(5),
    )
    .await;
    assert!(status.pid.is_none());

    // Still stopped after another stop
    handle.stop("long-runner").await.unwrap();
    let status = status_of(&handle, "long-runner").await;
    assert_eq!(status.state, LifecycleState::Stopped);

    let _ = handle.shutdown().await;
}

#[tokio::test]
async fn autorestart_disabled_marks_failed_on_exit() {
    let temp = TempDir::new().unwrap();
    let mut spec = shell_spec("no-restart", temp.path(), "exit 0");
    spec.autorestart = false;

    let (mut supervisor, handle) = Supervisor::with_defaults();
    supervisor.start(vec![spec]).await.unwrap();
    tokio::spawn(supervisor.run());

    let status = wait_for_state(
        &handle,
        "no-restart",
        LifecycleState::Failed,
        Duration::from_secs(5),
    )
    .await;
    assert_eq!(status.restarts, 0);
    assert_eq!(status.last_exit.as_deref(), Some("exit 0"));

    let _ = handle.shutdown().await;
}

#[tokio::test]
async fn one_watcher_crashing_does_not_disturb_another() {
    let temp = TempDir::new().unwrap();
    let mut crasher = shell_spec("noisy", temp.path(), "exit 1");
    crasher.max_restarts = 2;
    let quiet = shell_spec("quiet", temp.path(), "sleep 30");

    let (mut supervisor, handle) = Supervisor::with_defaults();
    supervisor.start(vec![crasher, quiet]).await.unwrap();
    tokio::spawn(supervisor.run());

    wait_for_state(&handle, "noisy", LifecycleState::Failed, Duration::from_secs(5)).await;

    let status = status_of(&handle, "quiet").await;
    assert!(matches!(
        status.state,
        LifecycleState::Starting | LifecycleState::Running
    ));
    assert!(status.pid.is_some());
    assert_eq!(status.restarts, 0);

    let _ = handle.shutdown().await;
}

#[tokio::test]
async fn shutdown_stops_the_fleet_and_reports() {
    let temp = TempDir::new().unwrap();
    let a = shell_spec("fleet-a", temp.path(), "sleep 30");
    let b = shell_spec("fleet-b", temp.path(), "sleep 30");

    let (mut supervisor, handle) = Supervisor::with_defaults();
    supervisor.start(vec![a, b]).await.unwrap();
    let loop_task = tokio::spawn(supervisor.run());

    let summary = handle.shutdown().await.unwrap();
    assert_eq!(summary.len(), 2);
    for status in &summary {
        assert_eq!(status.state, LifecycleState::Stopped);
        assert!(status.pid.is_none());
    }

    // Control loop has ended; further commands fail cleanly
    loop_task.await.unwrap();
    assert!(handle.status().await.is_err());
}
