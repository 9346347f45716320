pub mod monitor;
pub mod policy;
pub mod spawner;
pub mod supervisor;
pub mod types;

pub use policy::{BackoffStrategy, RestartPolicy};
pub use supervisor::{Supervisor, SupervisorConfig, SupervisorHandle};
pub use types::{ExitKind, LifecycleState, ProcessHandle, WatcherStatus};
