//! Process-backed executor: runs a script through an interpreter.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, trace};

use crate::core::{ExecError, TaskExecutor};

/// How scripts are launched.
#[derive(Clone, Debug)]
pub struct ProcessConfig {
    /// Program that runs the script (`python3`, `bash`, ...). Empty runs the
    /// reference directly as an executable.
    pub interpreter: String,
    /// Base directory for relative work references.
    pub script_root: Option<PathBuf>,
    /// Extra environment for every child.
    pub env: Vec<(String, String)>,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".into(),
            script_root: None,
            env: Vec::new(),
        }
    }
}

/// Executor that spawns one child process per task.
#[derive(Clone, Debug)]
pub struct ProcessExecutor {
    cfg: Arc<ProcessConfig>,
}

impl ProcessExecutor {
    /// Create an executor from its configuration.
    pub fn new(cfg: ProcessConfig) -> Self {
        Self { cfg: Arc::new(cfg) }
    }

    /// Resolve a work reference against `script_root` unless it is absolute.
    pub fn resolve(&self, work_reference: &str) -> PathBuf {
        let path = Path::new(work_reference);
        match &self.cfg.script_root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }

    fn command(&self, script: &Path, args: &[String]) -> Command {
        let mut cmd = if self.cfg.interpreter.is_empty() {
            Command::new(script)
        } else {
            let mut cmd = Command::new(&self.cfg.interpreter);
            cmd.arg(script);
            cmd
        };
        cmd.args(args);
        if let Some(root) = &self.cfg.script_root {
            cmd.current_dir(root);
        }
        for (k, v) in &self.cfg.env {
            cmd.env(k, v);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl TaskExecutor for ProcessExecutor {
    async fn execute(&self, work_reference: &str, args: &[String]) -> Result<(), ExecError> {
        let script = self.resolve(work_reference);
        trace!(target: "invoke.exec.proc", program = %self.cfg.interpreter, script = %script.display(), ?args, "spawn");

        let mut child = self
            .command(&script, args)
            .spawn()
            .map_err(|e| ExecError::Unavailable(format!("spawn {}: {e}", script.display())))?;

        let read_stdout = child.stdout.take().map(|stdout| {
            let mut lines = BufReader::new(stdout).lines();
            tokio::spawn(async move {
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "invoke.exec.proc.out", %line);
                }
            })
        });

        let status = child
            .wait()
            .await
            .map_err(|e| ExecError::Unavailable(format!("wait: {e}")))?;
        if let Some(reader) = read_stdout {
            let _ = reader.await;
        }

        if status.success() {
            debug!(target: "invoke.exec.proc", "exit success");
            return Ok(());
        }
        match status.code() {
            Some(code) => Err(ExecError::NonZeroExit { code }),
            None => Err(ExecError::KilledBySignal),
        }
    }
}
