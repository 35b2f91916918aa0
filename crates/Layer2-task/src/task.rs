//! Task definition and types

use docpool_foundation::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Unique identifier for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Generate a new random TaskId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Called with the worker pid once the worker has picked up the task
pub type StartHook = Box<dyn FnOnce(u32) + Send + 'static>;

/// A unit of work for a worker process
pub struct Job {
    /// Name of the handler registered in the worker
    pub op: String,

    /// Handler input
    pub payload: Value,

    /// Overrides the pool's task timeout
    pub timeout: Option<Duration>,

    pub on_start: Option<StartHook>,
}

impl Job {
    pub fn new(op: impl Into<String>, payload: Value) -> Self {
        Self {
            op: op.into(),
            payload,
            timeout: None,
            on_start: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn on_start<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(u32) + Send + 'static,
    {
        self.on_start = Some(Box::new(hook));
        self
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("op", &self.op)
            .field("timeout", &self.timeout)
            .field("on_start", &self.on_start.is_some())
            .finish()
    }
}

/// Pending result of a scheduled job
#[derive(Debug)]
pub struct TaskHandle {
    id: TaskId,
    rx: oneshot::Receiver<Result<Value>>,
    deadline: Duration,
}

impl TaskHandle {
    pub(crate) fn new(id: TaskId, rx: oneshot::Receiver<Result<Value>>, deadline: Duration) -> Self {
        Self { id, rx, deadline }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Wait for the result
    ///
    /// Bounded by queue wait + worker startup + task timeout + grace, so a
    /// lost supervisor can never hang the caller.
    pub async fn result(self) -> Result<Value> {
        match tokio::time::timeout(self.deadline, self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::Infrastructure(format!(
                "worker pool dropped task {} without an answer",
                self.id
            ))),
            Err(_) => Err(Error::Timeout(format!(
                "task {} got no answer within {} seconds",
                self.id,
                self.deadline.as_secs()
            ))),
        }
    }
}
