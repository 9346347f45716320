use crate::config::WatcherSpec;
use crate::error::{Result, WardenError};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::{Child, Command};

/// Metadata returned when spawning a watcher
#[derive(Debug)]
pub struct SpawnedChild {
    /// The child process handle
    pub child: Child,

    /// Process ID assigned by the OS
    pub pid: u32,
}

/// Spawn a watcher process from its spec
///
/// When an interpreter is configured the command line is
/// `<interpreter> <script> <args...>`; otherwise the script is executed
/// directly. The script path is resolved against `cwd` before the
/// existence check so a missing entry point fails here, as a spawn
/// failure, rather than as an interpreter error inside the child.
pub async fn spawn_watcher(spec: &WatcherSpec) -> Result<SpawnedChild> {
    let script = resolve_script(spec);
    if !script.exists() {
        return Err(WardenError::Spawn(
            spec.name.clone(),
            format!("script does not exist: {}", script.display()),
        ));
    }

    let mut command = match &spec.interpreter {
        Some(interpreter) => {
            let mut c = Command::new(interpreter);
            c.arg(&script);
            c
        }
        None => Command::new(&script),
    };

    if !spec.args.is_empty() {
        command.args(&spec.args);
    }

    if let Some(ref cwd) = spec.cwd {
        command.current_dir(cwd);
    }

    for (key, value) in &spec.env {
        command.env(key, value);
    }

    // Capture stdout and stderr as pipes for the log router
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());
    command.stdin(Stdio::null());

    let child = command
        .spawn()
        .map_err(|e| WardenError::Spawn(spec.name.clone(), e.to_string()))?;

    let pid = child.id().ok_or_else(|| {
        WardenError::Spawn(spec.name.clone(), "failed to get PID".to_string())
    })?;

    Ok(SpawnedChild { child, pid })
}

fn resolve_script(spec: &WatcherSpec) -> PathBuf {
    match &spec.cwd {
        Some(cwd) if spec.script.is_relative() => cwd.join(&spec.script),
        _ => spec.script.clone(),
    }
}
