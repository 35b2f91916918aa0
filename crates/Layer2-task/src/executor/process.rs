//! Worker process - one child process running [`crate::WorkerRuntime`]
//!
//! Features:
//! - `Ready` handshake with startup timeout
//! - Frame reader on stdout, log forwarding on stderr
//! - Per-task hard timeout: the worker is killed, never reused
//! - Clean retirement by closing stdin

use crate::pool::PoolConfig;
use crate::protocol::{
    decode_frame, encode_request, Payload, TaskOutcome, TaskRequest, WorkerMessage, ENV_SPILL_THRESHOLD,
    ENV_WORKER,
};
use crate::state::WorkerState;
use crate::task::{Job, TaskId};
use docpool_foundation::env_detect::ENV_PARSER_MEMORY_LIMIT;
use docpool_foundation::{Error, Result};
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, error, info, trace, warn};

/// How long a killed or retiring worker gets to exit
const EXIT_GRACE: Duration = Duration::from_secs(2);

// ============================================================================
// WorkerCommand
// ============================================================================

/// Program + arguments that start a worker
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Re-execute the running binary
    pub fn current_exe() -> Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

// ============================================================================
// WorkerProcess
// ============================================================================

/// A live worker child process
pub struct WorkerProcess {
    pid: u32,
    child: Child,
    stdin: Option<ChildStdin>,
    frames: mpsc::UnboundedReceiver<WorkerMessage>,
    state: WorkerState,
    tasks_completed: usize,
    spill_threshold: usize,
}

impl WorkerProcess {
    /// Spawn a worker and wait for its `Ready` frame
    pub async fn spawn(command: &WorkerCommand, config: &PoolConfig) -> Result<Self> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .env(ENV_WORKER, "1")
            .env(ENV_SPILL_THRESHOLD, config.spill_threshold.to_string())
            .env(ENV_PARSER_MEMORY_LIMIT, config.memory_limit.to_string())
            .envs(config.profiling.to_env())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            Error::Infrastructure(format!(
                "failed to spawn worker {}: {}",
                command.program.display(),
                e
            ))
        })?;

        let pid = child
            .id()
            .ok_or_else(|| Error::Infrastructure("worker exited before it got a pid".to_string()))?;
        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Infrastructure("worker stdout not captured".to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(read_frames(pid, stdout, tx));
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_logs(pid, stderr));
        }

        let mut worker = Self {
            pid,
            child,
            stdin,
            frames: rx,
            state: WorkerState::Starting,
            tasks_completed: 0,
            spill_threshold: config.spill_threshold,
        };

        match timeout(config.startup_timeout, worker.frames.recv()).await {
            Ok(Some(WorkerMessage::Ready { .. })) => {
                worker.state = WorkerState::Idle;
                debug!(pid, "worker ready");
                Ok(worker)
            }
            Ok(Some(other)) => {
                worker.kill().await;
                Err(Error::Infrastructure(format!(
                    "worker {} sent {:?} before its ready frame",
                    pid, other
                )))
            }
            Ok(None) => {
                let status = worker.reap().await;
                Err(Error::Infrastructure(format!(
                    "worker {} exited during startup ({})",
                    pid, status
                )))
            }
            Err(_) => {
                worker.kill().await;
                Err(Error::Infrastructure(format!(
                    "worker {} not ready after {} seconds",
                    pid,
                    config.startup_timeout.as_secs()
                )))
            }
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn tasks_completed(&self) -> usize {
        self.tasks_completed
    }

    /// The child is gone (crashed while idle, or killed)
    pub fn has_exited(&mut self) -> bool {
        self.state.is_terminal() || matches!(self.child.try_wait(), Ok(Some(_)))
    }

    /// Run one job on this worker
    ///
    /// On timeout the worker is killed and `Error::Timeout` returned; if the
    /// worker dies mid-task the result is `Error::WorkerDied`. Either way the
    /// worker ends in `Killed` and must not be reused.
    pub async fn run(&mut self, id: TaskId, job: Job, limit: Duration) -> Result<Value> {
        let Job {
            op,
            payload,
            on_start,
            ..
        } = job;

        let request = TaskRequest {
            id,
            op,
            payload: Payload::pack(payload, self.spill_threshold)?,
        };
        let line = encode_request(&request)?;
        let deadline = Instant::now() + limit;

        self.state = WorkerState::Running;
        if let Err(e) = self.write_line(&line).await {
            request.payload.discard();
            self.kill().await;
            return Err(Error::WorkerDied(format!(
                "could not hand task {} to worker {}: {}",
                id, self.pid, e
            )));
        }

        let mut on_start = on_start;
        loop {
            match timeout_at(deadline, self.frames.recv()).await {
                Ok(Some(WorkerMessage::Started { id: started, pid })) if started == id => {
                    trace!(pid, task = %id, "task started");
                    if let Some(hook) = on_start.take() {
                        hook(pid);
                    }
                }
                Ok(Some(WorkerMessage::Finished { id: finished, outcome })) if finished == id => {
                    self.state = WorkerState::Completed;
                    self.tasks_completed += 1;
                    return match outcome {
                        TaskOutcome::Success { payload } => payload.unpack(),
                        TaskOutcome::Failure { error } => Err(Error::from_remote(error)),
                    };
                }
                Ok(Some(other)) => {
                    warn!(pid = self.pid, task = %id, "unexpected frame: {:?}", other);
                    if let WorkerMessage::Finished {
                        outcome: TaskOutcome::Success { payload },
                        ..
                    } = other
                    {
                        payload.discard();
                    }
                }
                Ok(None) => {
                    request.payload.discard();
                    let status = self.reap().await;
                    return Err(Error::WorkerDied(format!(
                        "worker {} died while running task {} ({})",
                        self.pid, id, status
                    )));
                }
                Err(_) => {
                    request.payload.discard();
                    self.kill().await;
                    return Err(Error::Timeout(format!(
                        "task {} took more than {} seconds, killed worker {}",
                        id,
                        limit.as_secs(),
                        self.pid
                    )));
                }
            }
        }
    }

    /// Mark a completed worker idle again
    pub fn reset(&mut self) {
        if self.state == WorkerState::Completed {
            self.state = WorkerState::Idle;
        }
    }

    /// Force kill and reap
    pub async fn kill(&mut self) {
        self.state = WorkerState::Killed;
        if let Err(e) = self.child.start_kill() {
            debug!(pid = self.pid, error = %e, "kill failed, worker probably gone");
        }
        match timeout(EXIT_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => debug!(pid = self.pid, %status, "worker killed"),
            Ok(Err(e)) => warn!(pid = self.pid, error = %e, "failed to reap killed worker"),
            Err(_) => error!(pid = self.pid, "worker still alive after kill"),
        }
    }

    /// Close stdin and let the worker exit on its own; kill if it lingers
    pub async fn retire(mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.stdin.take();
        match timeout(EXIT_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => {
                self.state = WorkerState::Retired;
                debug!(pid = self.pid, %status, tasks = self.tasks_completed, "worker retired");
            }
            _ => self.kill().await,
        }
    }

    async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        let stdin = self.stdin.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "worker stdin closed")
        })?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await
    }

    /// Wait for a worker whose stdout already closed, describing how it ended
    async fn reap(&mut self) -> String {
        self.state = WorkerState::Killed;
        match timeout(EXIT_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => status.to_string(),
            Ok(Err(e)) => format!("wait failed: {}", e),
            Err(_) => {
                let _ = self.child.start_kill();
                let _ = self.child.wait().await;
                "closed stdout without exiting, killed".to_string()
            }
        }
    }
}

impl std::fmt::Debug for WorkerProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerProcess")
            .field("pid", &self.pid)
            .field("state", &self.state)
            .field("tasks_completed", &self.tasks_completed)
            .finish()
    }
}

// ============================================================================
// Background readers
// ============================================================================

/// Decode protocol frames from the worker's stdout
async fn read_frames(pid: u32, stdout: ChildStdout, tx: mpsc::UnboundedSender<WorkerMessage>) {
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                match decode_frame(&line) {
                    Some(Ok(message)) => {
                        if tx.send(message).is_err() {
                            break;
                        }
                    }
                    Some(Err(e)) => warn!(pid, error = %e, "malformed frame from worker"),
                    None => trace!(pid, "worker stdout: {}", line.trim_end()),
                }
            }
            Err(e) => {
                warn!(pid, error = %e, "worker stdout read failed");
                break;
            }
        }
    }
}

/// Re-emit worker log lines under the `docpool::worker` target
///
/// Workers log without timestamps or colors, so each line starts with its
/// level.
async fn forward_logs(pid: u32, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let trimmed = line.trim_start();
        if trimmed.is_empty() {
            continue;
        }
        let (level, message) = trimmed.split_once(' ').unwrap_or((trimmed, ""));
        let message = message.trim_start();
        match level {
            "ERROR" => error!(target: "docpool::worker", pid, "{}", message),
            "WARN" => warn!(target: "docpool::worker", pid, "{}", message),
            "INFO" => info!(target: "docpool::worker", pid, "{}", message),
            "DEBUG" => debug!(target: "docpool::worker", pid, "{}", message),
            "TRACE" => trace!(target: "docpool::worker", pid, "{}", message),
            // panic 메시지 등 포맷되지 않은 출력
            _ => warn!(target: "docpool::worker", pid, "{}", trimmed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_command_builder() {
        let cmd = WorkerCommand::new("/bin/docpool")
            .arg("worker")
            .args(["--quiet"])
            .env("RUST_LOG", "debug");
        assert_eq!(cmd.program, PathBuf::from("/bin/docpool"));
        assert_eq!(cmd.args, vec!["worker".to_string(), "--quiet".to_string()]);
        assert_eq!(cmd.env, vec![("RUST_LOG".to_string(), "debug".to_string())]);
    }

    #[tokio::test]
    async fn test_spawn_missing_binary_is_infrastructure() {
        let cmd = WorkerCommand::new("/nonexistent/docpool-worker");
        let err = WorkerProcess::spawn(&cmd, &PoolConfig::default())
            .await
            .unwrap_err();
        assert!(err.is_infrastructure());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_without_handshake_fails() {
        let cmd = WorkerCommand::new("sh").args(["-c", "echo not a frame; exit 3"]);
        let err = WorkerProcess::spawn(&cmd, &PoolConfig::default())
            .await
            .unwrap_err();
        assert!(err.is_infrastructure());
        assert!(err.to_string().contains("during startup"), "{}", err);
    }
}
