use std::collections::HashMap;
use sysinfo::{Pid, ProcessRefreshKind, System};

/// CPU/memory reading for one live watcher process
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceSample {
    pub cpu_usage: f32,
    pub memory_bytes: u64,
}

/// Samples resource usage of live watcher processes for status reporting
pub struct ResourceMonitor {
    system: System,
}

impl ResourceMonitor {
    pub fn new() -> Self {
        Self {
            system: System::new_all(),
        }
    }

    /// Refresh and read CPU/memory for the given PIDs
    ///
    /// PIDs that are no longer present in the system are absent from the
    /// result; liveness decisions stay with the supervisor's exit events,
    /// this is reporting only.
    pub fn sample(&mut self, pids: &[u32]) -> HashMap<u32, ResourceSample> {
        if pids.is_empty() {
            return HashMap::new();
        }

        let sys_pids: Vec<Pid> = pids.iter().map(|p| Pid::from_u32(*p)).collect();
        self.system.refresh_processes_specifics(
            sysinfo::ProcessesToUpdate::Some(&sys_pids),
            true,
            ProcessRefreshKind::everything(),
        );

        let mut samples = HashMap::new();
        for &pid in pids {
            if let Some(proc) = self.system.process(Pid::from_u32(pid)) {
                samples.insert(
                    pid,
                    ResourceSample {
                        cpu_usage: proc.cpu_usage(),
                        memory_bytes: proc.memory(),
                    },
                );
            }
        }

        samples
    }
}

impl Default for ResourceMonitor {
    fn default() -> Self {
        Self::new()
    }
}
