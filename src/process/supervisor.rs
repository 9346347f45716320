use crate::config::WatcherSpec;
use crate::error::{Result, WardenError};
use crate::logs::LogRouter;
use crate::process::monitor::ResourceMonitor;
use crate::process::policy::RestartPolicy;
use crate::process::spawner::spawn_watcher;
use crate::process::types::{ExitKind, LifecycleState, ProcessHandle, WatcherStatus};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Supervisor configuration
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// How often to sample CPU/memory of live watchers
    pub sample_interval: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_secs(10),
        }
    }
}

/// Lifecycle notifications posted to the control loop by per-child tasks
///
/// Every event carries the spawn epoch it was created under. The loop
/// compares it against the handle's current epoch and drops stale events;
/// this one check covers late exits from killed children, restart timers
/// that were overtaken by a stop, and stability timers for a respawned
/// child.
#[derive(Debug)]
enum LifecycleEvent {
    Exited {
        name: String,
        epoch: u64,
        status: Option<ExitStatus>,
    },
    StabilityReached {
        name: String,
        epoch: u64,
    },
    RestartDue {
        name: String,
        epoch: u64,
    },
}

/// Operator commands serviced by the control loop
enum SupervisorCommand {
    Stop {
        name: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Status {
        reply: oneshot::Sender<Vec<WatcherStatus>>,
    },
    Shutdown {
        reply: oneshot::Sender<Vec<WatcherStatus>>,
    },
}

/// Cheap cloneable handle for talking to a running supervisor
#[derive(Clone)]
pub struct SupervisorHandle {
    commands: mpsc::UnboundedSender<SupervisorCommand>,
}

impl SupervisorHandle {
    /// Stop the named watcher and suppress any further restart for it.
    /// Idempotent; safe to call while a restart timer is pending.
    pub async fn stop(&self, name: &str) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(SupervisorCommand::Stop {
                name: name.to_string(),
                reply: tx,
            })
            .map_err(|_| WardenError::SupervisorClosed)?;
        rx.await.map_err(|_| WardenError::SupervisorClosed)?
    }

    /// Snapshot of every watcher, sorted by name
    pub async fn status(&self) -> Result<Vec<WatcherStatus>> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(SupervisorCommand::Status { reply: tx })
            .map_err(|_| WardenError::SupervisorClosed)?;
        rx.await.map_err(|_| WardenError::SupervisorClosed)
    }

    /// Stop all watchers gracefully and end the control loop; returns the
    /// final snapshot of the fleet
    pub async fn shutdown(&self) -> Result<Vec<WatcherStatus>> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(SupervisorCommand::Shutdown { reply: tx })
            .map_err(|_| WardenError::SupervisorClosed)?;
        rx.await.map_err(|_| WardenError::SupervisorClosed)
    }
}

/// Process supervisor: owns every watcher handle and multiplexes their
/// lifecycle events on a single control loop
///
/// The loop never blocks on any one child. Child exits arrive as events
/// from detached waiter tasks, restart back-off and stability promotion
/// are scheduled timers posting events, and stop escalation runs detached.
pub struct Supervisor {
    watchers: HashMap<String, ProcessHandle>,
    router: LogRouter,
    monitor: ResourceMonitor,
    config: SupervisorConfig,
    events_tx: mpsc::UnboundedSender<LifecycleEvent>,
    events_rx: mpsc::UnboundedReceiver<LifecycleEvent>,
    commands_rx: mpsc::UnboundedReceiver<SupervisorCommand>,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> (Self, SupervisorHandle) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let supervisor = Self {
            watchers: HashMap::new(),
            router: LogRouter::new(),
            monitor: ResourceMonitor::new(),
            config,
            events_tx,
            events_rx,
            commands_rx,
        };
        let handle = SupervisorHandle { commands: commands_tx };

        (supervisor, handle)
    }

    pub fn with_defaults() -> (Self, SupervisorHandle) {
        Self::new(SupervisorConfig::default())
    }

    /// Spawn one watcher per spec
    ///
    /// A spec whose spawn or log sink acquisition fails lands in `Failed`
    /// immediately, is reported, and consumes no restart attempt; the
    /// remaining specs still launch. Only a duplicate name is an error.
    pub async fn start(&mut self, specs: Vec<WatcherSpec>) -> Result<()> {
        for spec in specs {
            if self.watchers.contains_key(&spec.name) {
                return Err(WardenError::WatcherAlreadyExists(spec.name));
            }

            if spec.watch {
                warn!(watcher = %spec.name, "watch flag is not supported, ignoring");
            }

            let name = spec.name.clone();
            let mut handle = ProcessHandle::new(Arc::new(spec));
            Self::launch(&mut self.router, &self.events_tx, &mut handle).await;
            self.watchers.insert(name, handle);
        }
        Ok(())
    }

    /// Run the control loop until `shutdown()` completes
    pub async fn run(mut self) {
        let mut tick = tokio::time::interval(self.config.sample_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown_reply: Option<oneshot::Sender<Vec<WatcherStatus>>> = None;

        loop {
            tokio::select! {
                Some(cmd) = self.commands_rx.recv() => match cmd {
                    SupervisorCommand::Stop { name, reply } => {
                        let _ = reply.send(self.stop_watcher(&name));
                    }
                    SupervisorCommand::Status { reply } => {
                        let _ = reply.send(self.status_snapshot());
                    }
                    SupervisorCommand::Shutdown { reply } => {
                        info!("shutdown requested, stopping all watchers");
                        let names: Vec<String> = self.watchers.keys().cloned().collect();
                        for name in names {
                            let _ = self.stop_watcher(&name);
                        }
                        shutdown_reply = Some(reply);
                    }
                },
                Some(event) = self.events_rx.recv() => self.handle_event(event).await,
                _ = tick.tick() => self.sample_resources(),
            }

            if shutdown_reply.is_some() && self.quiescent() {
                if let Some(reply) = shutdown_reply.take() {
                    let _ = reply.send(self.status_snapshot());
                }
                break;
            }
        }
    }

    fn quiescent(&self) -> bool {
        self.watchers.values().all(|h| h.pid.is_none())
    }

    async fn handle_event(&mut self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::Exited { name, epoch, status } => {
                self.on_exit(&name, epoch, status);
            }
            LifecycleEvent::StabilityReached { name, epoch } => {
                self.on_stability(&name, epoch);
            }
            LifecycleEvent::RestartDue { name, epoch } => {
                self.on_restart_due(&name, epoch).await;
            }
        }
    }

    /// (Re)spawn the handle's watcher and wire up its event sources
    async fn launch(
        router: &mut LogRouter,
        events: &mpsc::UnboundedSender<LifecycleEvent>,
        handle: &mut ProcessHandle,
    ) {
        handle.epoch += 1;
        let epoch = handle.epoch;
        let spec = Arc::clone(&handle.spec);

        // Sinks are acquired before the child exists: output that cannot
        // be captured must fail the launch, not run unlogged.
        let sinks = match router.open_sinks(&spec).await {
            Ok(sinks) => sinks,
            Err(e) => {
                error!(watcher = %spec.name, "log sink failure: {}", e);
                handle.pid = None;
                handle.state = LifecycleState::Failed;
                return;
            }
        };

        let mut spawned = match spawn_watcher(&spec).await {
            Ok(spawned) => spawned,
            Err(e) => {
                error!(watcher = %spec.name, "spawn failure: {}", e);
                handle.pid = None;
                handle.state = LifecycleState::Failed;
                return;
            }
        };

        sinks.bind(&spec.name, &mut spawned.child);

        handle.pid = Some(spawned.pid);
        handle.started_at = Some(Instant::now());
        handle.state = LifecycleState::Starting;
        info!(watcher = %spec.name, pid = spawned.pid, "starting");

        // Exit notification
        let tx = events.clone();
        let name = spec.name.clone();
        let mut child = spawned.child;
        tokio::spawn(async move {
            let status = child.wait().await.ok();
            let _ = tx.send(LifecycleEvent::Exited { name, epoch, status });
        });

        // Stability promotion after min_uptime
        let tx = events.clone();
        let name = spec.name.clone();
        let min_uptime = spec.min_uptime;
        tokio::spawn(async move {
            tokio::time::sleep(min_uptime).await;
            let _ = tx.send(LifecycleEvent::StabilityReached { name, epoch });
        });
    }

    fn on_exit(&mut self, name: &str, epoch: u64, status: Option<ExitStatus>) {
        let Some(handle) = self.watchers.get_mut(name) else {
            return;
        };
        if handle.epoch != epoch {
            debug!(watcher = name, "ignoring exit event from a previous spawn");
            return;
        }

        let uptime = handle.uptime();
        let exit = ExitKind::from_status(status);
        handle.pid = None;
        handle.last_exit = Some(exit);

        if handle.stop_requested {
            handle.state = LifecycleState::Stopped;
            info!(watcher = name, %exit, "stopped");
            return;
        }

        handle.state = if exit.is_clean() {
            LifecycleState::Exited
        } else {
            LifecycleState::Crashed
        };

        let policy = RestartPolicy::from_spec(&handle.spec);

        // Uptime-based counter reset: a run that stayed up past min_uptime
        // wipes the crash-loop history before the ceiling check.
        if handle.restarts > 0 && policy.resets_counter(uptime) {
            debug!(
                watcher = name,
                restarts = handle.restarts,
                "stable run, restart counter reset"
            );
            handle.restarts = 0;
        }

        match policy.next_attempt(handle.restarts) {
            Some(delay) => {
                handle.restarts += 1;
                handle.state = LifecycleState::Restarting;
                info!(
                    watcher = name,
                    %exit,
                    restart = handle.restarts,
                    delay_ms = delay.as_millis() as u64,
                    "scheduling restart"
                );

                let tx = self.events_tx.clone();
                let name = name.to_string();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(LifecycleEvent::RestartDue { name, epoch });
                });
            }
            None => {
                handle.state = LifecycleState::Failed;
                warn!(
                    watcher = name,
                    %exit,
                    restarts = handle.restarts,
                    "restart policy exhausted, marking failed"
                );
            }
        }
    }

    fn on_stability(&mut self, name: &str, epoch: u64) {
        let Some(handle) = self.watchers.get_mut(name) else {
            return;
        };
        if handle.epoch != epoch || handle.state != LifecycleState::Starting {
            return;
        }
        handle.state = LifecycleState::Running;
        info!(watcher = name, uptime = ?handle.spec.min_uptime, "running");
    }

    async fn on_restart_due(&mut self, name: &str, epoch: u64) {
        let Some(handle) = self.watchers.get_mut(name) else {
            return;
        };
        if handle.epoch != epoch
            || handle.state != LifecycleState::Restarting
            || handle.stop_requested
        {
            debug!(watcher = name, "ignoring stale restart timer");
            return;
        }
        Self::launch(&mut self.router, &self.events_tx, handle).await;
    }

    fn stop_watcher(&mut self, name: &str) -> Result<()> {
        let handle = self
            .watchers
            .get_mut(name)
            .ok_or_else(|| WardenError::WatcherNotFound(name.to_string()))?;

        if handle.stop_requested || handle.state.is_terminal() {
            return Ok(());
        }
        handle.stop_requested = true;

        match handle.state {
            LifecycleState::Starting | LifecycleState::Running => {
                let Some(pid) = handle.pid else {
                    handle.state = LifecycleState::Stopped;
                    return Ok(());
                };

                let sig = parse_signal(&handle.spec.stop_signal)?;
                info!(
                    watcher = name,
                    pid,
                    signal = %handle.spec.stop_signal,
                    "stopping"
                );
                if let Err(e) = signal::kill(Pid::from_raw(pid as i32), sig) {
                    // Already gone; the waiter task will report the exit
                    debug!(watcher = name, "stop signal not delivered: {}", e);
                }

                // SIGKILL escalation if the child outlives the stop timeout
                let timeout = handle.spec.stop_timeout;
                let watcher = name.to_string();
                tokio::spawn(async move {
                    tokio::time::sleep(timeout).await;
                    if signal::kill(Pid::from_raw(pid as i32), Signal::SIGKILL).is_ok() {
                        warn!(
                            watcher = %watcher,
                            pid,
                            "did not exit within stop timeout, sent SIGKILL"
                        );
                    }
                });
            }
            LifecycleState::Restarting
            | LifecycleState::Exited
            | LifecycleState::Crashed => {
                info!(watcher = name, "stop requested, cancelling pending restart");
                handle.state = LifecycleState::Stopped;
            }
            LifecycleState::Stopped | LifecycleState::Failed => {}
        }

        Ok(())
    }

    fn status_snapshot(&self) -> Vec<WatcherStatus> {
        let mut statuses: Vec<WatcherStatus> = self
            .watchers
            .values()
            .map(|h| WatcherStatus {
                name: h.spec.name.clone(),
                state: h.state,
                pid: h.pid,
                restarts: h.restarts,
                uptime: if h.pid.is_some() { h.uptime() } else { None },
                cpu_usage: h.cpu_usage,
                memory_bytes: h.memory_bytes,
                last_exit: h.last_exit.map(|e| e.to_string()),
            })
            .collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    fn sample_resources(&mut self) {
        let pids: Vec<u32> = self.watchers.values().filter_map(|h| h.pid).collect();
        if pids.is_empty() {
            return;
        }

        let samples = self.monitor.sample(&pids);
        for handle in self.watchers.values_mut() {
            if let Some(pid) = handle.pid {
                if let Some(sample) = samples.get(&pid) {
                    handle.cpu_usage = sample.cpu_usage;
                    handle.memory_bytes = sample.memory_bytes;
                }
            }
        }
    }
}

fn parse_signal(signal_name: &str) -> Result<Signal> {
    match signal_name {
        "SIGTERM" => Ok(Signal::SIGTERM),
        "SIGINT" => Ok(Signal::SIGINT),
        "SIGQUIT" => Ok(Signal::SIGQUIT),
        "SIGKILL" => Ok(Signal::SIGKILL),
        "SIGHUP" => Ok(Signal::SIGHUP),
        "SIGUSR1" => Ok(Signal::SIGUSR1),
        "SIGUSR2" => Ok(Signal::SIGUSR2),
        _ => Err(WardenError::Signal(format!(
            "Invalid signal name: {}",
            signal_name
        ))),
    }
}
