use crate::config::WatcherSpec;
use serde::Serialize;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lifecycle state of a supervised watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LifecycleState {
    /// Launch requested; not yet up for `min_uptime`
    Starting,
    /// Alive continuously for at least `min_uptime`
    Running,
    /// Terminated with exit code 0
    Exited,
    /// Terminated with a nonzero exit code or by signal
    Crashed,
    /// Respawn decided; back-off timer pending
    Restarting,
    /// Stopped by the operator; no restart follows
    Stopped,
    /// Terminal: restarts exhausted, autorestart disabled, or spawn/sink failure
    Failed,
}

impl LifecycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Stopped | LifecycleState::Failed)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Starting => write!(f, "starting"),
            LifecycleState::Running => write!(f, "running"),
            LifecycleState::Exited => write!(f, "exited"),
            LifecycleState::Crashed => write!(f, "crashed"),
            LifecycleState::Restarting => write!(f, "restarting"),
            LifecycleState::Stopped => write!(f, "stopped"),
            LifecycleState::Failed => write!(f, "failed"),
        }
    }
}

/// How a watcher process terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    Clean,
    Code(i32),
    Signal(i32),
    Unknown,
}

impl ExitKind {
    pub fn from_status(status: Option<ExitStatus>) -> Self {
        let Some(status) = status else {
            return ExitKind::Unknown;
        };

        if status.success() {
            return ExitKind::Clean;
        }

        if let Some(code) = status.code() {
            return ExitKind::Code(code);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(sig) = status.signal() {
                return ExitKind::Signal(sig);
            }
        }

        ExitKind::Unknown
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, ExitKind::Clean)
    }
}

impl std::fmt::Display for ExitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitKind::Clean => write!(f, "exit 0"),
            ExitKind::Code(code) => write!(f, "exit {}", code),
            ExitKind::Signal(sig) => write!(f, "signal {}", sig),
            ExitKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Runtime record for one supervised watcher
///
/// Owned exclusively by the supervisor's control loop; per-child tasks
/// never touch it, they post events instead. The spawn epoch increments on
/// every launch so events from a previous spawn are recognizably stale.
#[derive(Debug)]
pub struct ProcessHandle {
    pub spec: Arc<WatcherSpec>,
    pub state: LifecycleState,
    pub pid: Option<u32>,
    pub restarts: u32,
    pub epoch: u64,
    pub started_at: Option<Instant>,
    pub last_exit: Option<ExitKind>,
    pub stop_requested: bool,
    pub cpu_usage: f32,
    pub memory_bytes: u64,
}

impl ProcessHandle {
    pub fn new(spec: Arc<WatcherSpec>) -> Self {
        Self {
            spec,
            state: LifecycleState::Starting,
            pid: None,
            restarts: 0,
            epoch: 0,
            started_at: None,
            last_exit: None,
            stop_requested: false,
            cpu_usage: 0.0,
            memory_bytes: 0,
        }
    }

    /// Time since the current (or most recent) spawn
    pub fn uptime(&self) -> Option<Duration> {
        self.started_at.map(|t| t.elapsed())
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }
}

/// Point-in-time snapshot of a watcher, as reported by `status()`
#[derive(Debug, Clone, Serialize)]
pub struct WatcherStatus {
    pub name: String,
    pub state: LifecycleState,
    pub pid: Option<u32>,
    pub restarts: u32,
    pub uptime: Option<Duration>,
    pub cpu_usage: f32,
    pub memory_bytes: u64,
    pub last_exit: Option<String>,
}
