use crate::config::WatcherSpec;
use crate::error::{Result, WardenError};
use crate::logs::format::compile_date_format;
use chrono::Local;
use std::collections::HashMap;
use std::path::Path;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout};
use tracing::warn;

/// Open stdout/stderr destinations for one spawn of a watcher
///
/// Sinks are always opened in append mode and never truncated, so log
/// history survives restarts. Each restart reopens fresh handles; the old
/// pump tasks drain and finish when the previous child's pipes close.
pub struct LogSinks {
    out: File,
    err: File,
    stamp: Option<String>,
}

impl LogSinks {
    /// Open the sink files named by the spec, creating parent directories
    /// and files as needed
    pub async fn open(spec: &WatcherSpec, stamp: Option<String>) -> Result<Self> {
        let out = Self::open_append(&spec.out_file)
            .await
            .map_err(|e| WardenError::LogSink(spec.name.clone(), e.to_string()))?;
        let err = Self::open_append(&spec.error_file)
            .await
            .map_err(|e| WardenError::LogSink(spec.name.clone(), e.to_string()))?;

        Ok(Self { out, err, stamp })
    }

    async fn open_append(path: &Path) -> std::io::Result<File> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        OpenOptions::new().create(true).append(true).open(path).await
    }

    /// Bind the child's stdio to the sinks
    pub fn bind(self, name: &str, child: &mut Child) {
        self.spawn_pumps(name, child.stdout.take(), child.stderr.take());
    }

    /// Spawn the pump tasks binding the child's stdio to the sinks
    ///
    /// Tasks run until the pipes close (child exit or kill); they outlive
    /// the supervisor's interest in the spawn, draining any final output.
    fn spawn_pumps(self, name: &str, stdout: Option<ChildStdout>, stderr: Option<ChildStderr>) {
        if let Some(stdout) = stdout {
            let stamp = self.stamp.clone();
            let watcher = name.to_string();
            let file = self.out;
            tokio::spawn(async move {
                pump_lines(stdout, file, stamp, &watcher, "stdout").await;
            });
        }

        if let Some(stderr) = stderr {
            let stamp = self.stamp;
            let watcher = name.to_string();
            let file = self.err;
            tokio::spawn(async move {
                pump_lines(stderr, file, stamp, &watcher, "stderr").await;
            });
        }
    }
}

/// Copy lines from a child pipe into a sink file, stamping each line when a
/// compiled date format is configured
async fn pump_lines<R>(
    reader: R,
    mut file: File,
    stamp: Option<String>,
    watcher: &str,
    stream: &str,
) where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let entry = match &stamp {
                    Some(fmt) => format!("{}: {}\n", Local::now().format(fmt), line),
                    None => format!("{}\n", line),
                };
                if let Err(e) = file.write_all(entry.as_bytes()).await {
                    warn!(watcher, stream, "log sink write failed: {}", e);
                    break;
                }
                if let Err(e) = file.flush().await {
                    warn!(watcher, stream, "log sink flush failed: {}", e);
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(watcher, stream, "failed reading child output: {}", e);
                break;
            }
        }
    }
}

/// Routes watcher stdout/stderr into the files named by each spec
///
/// Owned by the supervisor; `attach` is only called from the control loop,
/// which serializes sink opens. Compiled date formats are cached per
/// watcher so restarts do not re-translate the format string.
pub struct LogRouter {
    compiled_formats: HashMap<String, String>,
}

impl LogRouter {
    pub fn new() -> Self {
        Self {
            compiled_formats: HashMap::new(),
        }
    }

    /// Open the spec's sinks, ready to bind to a child
    ///
    /// Called once per spawn, before the child exists: a watcher whose
    /// output cannot be captured must not be launched at all.
    pub async fn open_sinks(&mut self, spec: &WatcherSpec) -> Result<LogSinks> {
        let stamp = match &spec.log_date_format {
            Some(fmt) => Some(match self.compiled_formats.get(&spec.name) {
                Some(compiled) => compiled.clone(),
                None => {
                    let compiled = compile_date_format(fmt)?;
                    self.compiled_formats
                        .insert(spec.name.clone(), compiled.clone());
                    compiled
                }
            }),
            None => None,
        };

        LogSinks::open(spec, stamp).await
    }

    /// Open the spec's sinks and bind the child's stdio to them
    pub async fn attach(&mut self, spec: &WatcherSpec, child: &mut Child) -> Result<()> {
        let sinks = self.open_sinks(spec).await?;
        sinks.bind(&spec.name, child);
        Ok(())
    }
}

impl Default for LogRouter {
    fn default() -> Self {
        Self::new()
    }
}
