//! Task dispatcher
//!
//! Turns a parse request into a pool job, wires the worker pid into the
//! in-flight registry, and rewrites timeout / dead-worker errors into
//! messages naming the URL and the pid that was killed.

use crate::registry::LeaderGuard;
use docpool_foundation::{Error, Result};
use docpool_task::{Executor, Job};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct Dispatcher {
    executor: Arc<dyn Executor>,
    timeout: Duration,
    dispatches: AtomicU64,
    timeouts: AtomicU64,
    deaths: AtomicU64,
}

impl Dispatcher {
    pub fn new(executor: Arc<dyn Executor>, timeout: Duration) -> Self {
        Self {
            executor,
            timeout,
            dispatches: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            deaths: AtomicU64::new(0),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    /// Run `op` on a worker for the key held by `guard`
    pub async fn dispatch<R, T>(
        &self,
        guard: &LeaderGuard<T>,
        op: &str,
        url: &str,
        payload: Value,
    ) -> Result<R>
    where
        R: DeserializeOwned,
        T: Clone + Send + Sync + 'static,
    {
        self.dispatches.fetch_add(1, Ordering::Relaxed);
        debug!(key = %guard.key(), op, url, "dispatching to worker");

        let job = Job::new(op, payload)
            .with_timeout(self.timeout)
            .on_start(guard.pid_recorder());

        match self.executor.execute(job).await {
            Ok(value) => Ok(serde_json::from_value(value)?),
            Err(Error::Timeout(detail)) => {
                self.timeouts.fetch_add(1, Ordering::Relaxed);
                let message = format!(
                    "[timeout] The parser took more than {} seconds to complete parsing of \"{}\", killed it! ({})",
                    self.timeout.as_secs(),
                    url,
                    describe_pid(guard.pid()),
                );
                warn!(%detail, "{}", message);
                Err(Error::Timeout(message))
            }
            Err(Error::WorkerDied(detail)) => {
                self.deaths.fetch_add(1, Ordering::Relaxed);
                let message = format!(
                    "[worker died] The parser process died while parsing \"{}\" ({}): {}",
                    url,
                    describe_pid(guard.pid()),
                    detail
                );
                warn!("{}", message);
                Err(Error::WorkerDied(message))
            }
            Err(e) => Err(e),
        }
    }

    pub fn dispatches(&self) -> u64 {
        self.dispatches.load(Ordering::Relaxed)
    }

    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    pub fn worker_deaths(&self) -> u64 {
        self.deaths.load(Ordering::Relaxed)
    }
}

fn describe_pid(pid: Option<u32>) -> String {
    match pid {
        Some(pid) => format!("pid {}", pid),
        None => "pid unknown".to_string(),
    }
}
