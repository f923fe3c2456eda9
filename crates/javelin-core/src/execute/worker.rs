//! Worker JVM process management.

use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use super::protocol::{WorkerCommand, WorkerReply};
use crate::error::{Error, Result};

/// Main class of the worker runtime.
pub const WORKER_MAIN_CLASS: &str = "javelin.runtime.KernelWorker";

/// Handle to a running worker JVM.
///
/// The process is killed when the handle is dropped.
pub struct WorkerHandle {
    child: Child,
    stdin: BufWriter<ChildStdin>,
    stdout: BufReader<ChildStdout>,
}

impl WorkerHandle {
    /// Start a worker whose class loader is rooted at `classes_dir`.
    pub async fn spawn(java: &Path, runtime_dir: &Path, classes_dir: &Path) -> Result<Self> {
        let mut child = Command::new(java)
            .arg("-cp")
            .arg(runtime_dir)
            .arg("-Dfile.encoding=UTF-8")
            .arg("-XX:+UseSerialGC")
            .arg(WORKER_MAIN_CLASS)
            .arg(classes_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::Worker(format!("failed to spawn worker '{}': {e}", java.display()))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Worker("failed to get worker stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Worker("failed to get worker stdout".to_string()))?;

        let mut handle = Self {
            child,
            stdin: BufWriter::new(stdin),
            stdout: BufReader::new(stdout),
        };

        match handle.request(&WorkerCommand::Ping).await? {
            WorkerReply::Pong => {
                tracing::info!("Worker JVM started (pid {:?})", handle.pid());
                Ok(handle)
            }
            other => Err(Error::Worker(format!(
                "unexpected response from worker: {other:?}"
            ))),
        }
    }

    /// Send a command and wait for its reply.
    pub async fn request(&mut self, command: &WorkerCommand) -> Result<WorkerReply> {
        let line = command.encode()?;
        tracing::trace!("-> worker: {}", line);

        let write = async {
            self.stdin.write_all(line.as_bytes()).await?;
            self.stdin.write_all(b"\n").await?;
            self.stdin.flush().await
        };
        write
            .await
            .map_err(|e| Error::Worker(format!("worker stdin closed: {e}")))?;

        let mut reply = String::new();
        let read = self
            .stdout
            .read_line(&mut reply)
            .await
            .map_err(|e| Error::Worker(format!("failed to read worker reply: {e}")))?;
        if read == 0 {
            let status = self.child.try_wait().ok().flatten();
            return Err(Error::Worker(match status {
                Some(status) => format!("worker exited ({status})"),
                None => "worker closed its output".to_string(),
            }));
        }
        WorkerReply::parse(&reply)
    }

    /// Whether the process is still running.
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Kill the process immediately.
    pub async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::warn!("Failed to kill worker: {}", e);
        }
    }

    /// Ask the worker to exit, killing it if it does not answer.
    pub async fn shutdown(mut self) -> Result<()> {
        let exit = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            self.request(&WorkerCommand::Exit),
        )
        .await;
        if !matches!(exit, Ok(Ok(WorkerReply::Ok))) {
            self.kill().await;
            return Ok(());
        }
        self.child
            .wait()
            .await
            .map_err(|e| Error::Worker(format!("failed to wait for worker: {e}")))?;
        Ok(())
    }
}
