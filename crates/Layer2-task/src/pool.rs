//! Worker pool - bounded set of worker processes with per-task supervision
//!
//! ```text
//! schedule(job) ──▶ supervisor task
//!                     1. permit (≤ max_workers in flight, queue timeout)
//!                     2. idle worker, or spawn one
//!                     3. run with hard timeout
//!                     4. answer the caller
//!                     5. killed → replace | max tasks → retire + replace | else → idle
//! ```
//!
//! Each task gets its own supervisor, so a hung parse never blocks other
//! callers: the supervisor kills exactly the worker it owns.

use crate::executor::{Executor, WorkerCommand, WorkerProcess};
use crate::task::{Job, TaskHandle, TaskId};
use async_trait::async_trait;
use docpool_foundation::{DocpoolConfig, Environment, Error, ProfilingFlags, Result};
use futures::future::try_join_all;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Semaphore};
use tracing::{debug, info, warn};

/// Extra time granted to a [`TaskHandle`] beyond the pool's own limits
const HANDLE_GRACE: Duration = Duration::from_secs(5);

// ============================================================================
// PoolConfig
// ============================================================================

/// Worker pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of live workers (and tasks in flight)
    pub max_workers: usize,

    /// Tasks a worker runs before it is replaced (0 = never)
    pub max_tasks_per_worker: usize,

    /// Default per-task timeout
    pub task_timeout: Duration,

    /// Time a new worker has to send its ready frame
    pub startup_timeout: Duration,

    /// Time a job may wait for a free worker
    pub queue_timeout: Duration,

    /// Payloads above this many bytes go through temp files (0 = never)
    pub spill_threshold: usize,

    /// Worker address space limit in bytes (0 = unlimited)
    pub memory_limit: u64,

    /// Profiling switches forwarded to workers
    pub profiling: ProfilingFlags,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::from_settings(&DocpoolConfig::default(), &Environment::detect())
    }
}

impl PoolConfig {
    /// Resolve the effective pool settings for this environment
    pub fn from_settings(config: &DocpoolConfig, env: &Environment) -> Self {
        let pool = &config.pool;
        let memory_limit = if env.os.supports_memory_limit() {
            env.parser_memory_limit.unwrap_or(pool.memory_limit)
        } else {
            0
        };

        Self {
            max_workers: config.effective_max_workers(env),
            max_tasks_per_worker: pool.max_tasks_per_worker,
            task_timeout: config.effective_parser_timeout(env),
            startup_timeout: Duration::from_secs(pool.startup_timeout_secs),
            queue_timeout: Duration::from_secs(pool.queue_timeout_secs),
            spill_threshold: pool.spill_threshold,
            memory_limit,
            profiling: env.profiling,
        }
    }

    pub fn with_max_workers(mut self, n: usize) -> Self {
        self.max_workers = n.max(1);
        self
    }

    pub fn with_max_tasks_per_worker(mut self, n: usize) -> Self {
        self.max_tasks_per_worker = n;
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn with_queue_timeout(mut self, timeout: Duration) -> Self {
        self.queue_timeout = timeout;
        self
    }

    pub fn with_spill_threshold(mut self, bytes: usize) -> Self {
        self.spill_threshold = bytes;
        self
    }

    pub fn with_memory_limit(mut self, bytes: u64) -> Self {
        self.memory_limit = bytes;
        self
    }
}

// ============================================================================
// Stats
// ============================================================================

/// Snapshot of pool activity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub max_workers: usize,
    pub idle_workers: usize,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub timeouts: u64,
    pub workers_spawned: u64,
    pub workers_killed: u64,
    pub workers_retired: u64,
}

#[derive(Default)]
struct Counters {
    completed: AtomicU64,
    failed: AtomicU64,
    timeouts: AtomicU64,
    spawned: AtomicU64,
    killed: AtomicU64,
    retired: AtomicU64,
}

// ============================================================================
// WorkerPool
// ============================================================================

struct PoolShared {
    command: WorkerCommand,
    config: PoolConfig,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<WorkerProcess>>,
    closed: AtomicBool,
    counters: Counters,
}

/// Pool of out-of-process workers
pub struct WorkerPool {
    started: tokio::sync::Mutex<bool>,
    shared: Arc<PoolShared>,
}

impl WorkerPool {
    pub fn new(command: WorkerCommand, config: PoolConfig) -> Self {
        let config = PoolConfig {
            max_workers: config.max_workers.max(1),
            ..config
        };
        Self {
            started: tokio::sync::Mutex::new(false),
            shared: Arc::new(PoolShared {
                command,
                permits: Arc::new(Semaphore::new(config.max_workers)),
                idle: Mutex::new(Vec::with_capacity(config.max_workers)),
                closed: AtomicBool::new(false),
                counters: Counters::default(),
                config,
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Fill the pool up to `max_workers` live workers. Idempotent.
    ///
    /// Workers already spawned on demand by a bare [`schedule`](Self::schedule),
    /// idle or busy, count towards the total.
    pub async fn start(&self) -> Result<()> {
        let mut started = self.started.lock().await;
        if *started {
            return Ok(());
        }
        if self.is_closed() {
            return Err(Error::PoolClosed);
        }

        let shared = &self.shared;
        let max_workers = shared.config.max_workers;
        let busy = max_workers.saturating_sub(shared.permits.available_permits());
        let idle = shared.idle.lock().len();
        let missing = max_workers.saturating_sub(idle + busy);

        let spawns = (0..missing).map(|_| WorkerProcess::spawn(&shared.command, &shared.config));
        let workers = try_join_all(spawns).await?;
        shared
            .counters
            .spawned
            .fetch_add(workers.len() as u64, Ordering::Relaxed);

        let pids: Vec<u32> = workers.iter().map(|w| w.pid()).collect();
        shared.idle.lock().extend(workers);
        *started = true;

        info!(
            workers = shared.config.max_workers,
            timeout_secs = shared.config.task_timeout.as_secs(),
            "worker pool started {:?}",
            pids
        );
        Ok(())
    }

    /// Queue a job; the returned handle resolves once a worker finished it
    pub fn schedule(&self, job: Job) -> Result<TaskHandle> {
        if self.is_closed() {
            return Err(Error::PoolClosed);
        }

        let config = &self.shared.config;
        let limit = job.timeout.unwrap_or(config.task_timeout);
        let deadline = config.queue_timeout + config.startup_timeout + limit + HANDLE_GRACE;

        let id = TaskId::new();
        let (tx, rx) = oneshot::channel();
        debug!(task = %id, op = %job.op, "scheduling task");
        tokio::spawn(supervise(Arc::clone(&self.shared), id, job, tx));

        Ok(TaskHandle::new(id, rx, deadline))
    }

    /// Start if needed, run the job and wait for its output
    pub async fn execute(&self, job: Job) -> Result<Value> {
        self.start().await?;
        self.schedule(job)?.result().await
    }

    /// Stop accepting jobs and kill idle workers. Idempotent.
    ///
    /// Tasks already running finish; their supervisors kill the workers
    /// afterwards.
    pub async fn stop(&self) {
        let idle = {
            let mut idle = self.shared.idle.lock();
            if self.shared.closed.swap(true, Ordering::SeqCst) {
                return;
            }
            std::mem::take(&mut *idle)
        };
        self.shared.permits.close();

        let count = idle.len();
        futures::future::join_all(idle.into_iter().map(|mut worker| async move {
            worker.kill().await;
        }))
        .await;
        self.shared
            .counters
            .retired
            .fetch_add(count as u64, Ordering::Relaxed);
        info!(retired = count, "worker pool stopped");
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> PoolStats {
        let c = &self.shared.counters;
        PoolStats {
            max_workers: self.shared.config.max_workers,
            idle_workers: self.shared.idle.lock().len(),
            tasks_completed: c.completed.load(Ordering::Relaxed),
            tasks_failed: c.failed.load(Ordering::Relaxed),
            timeouts: c.timeouts.load(Ordering::Relaxed),
            workers_spawned: c.spawned.load(Ordering::Relaxed),
            workers_killed: c.killed.load(Ordering::Relaxed),
            workers_retired: c.retired.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("command", &self.shared.command)
            .field("config", &self.shared.config)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[async_trait]
impl Executor for WorkerPool {
    async fn execute(&self, job: Job) -> Result<Value> {
        WorkerPool::execute(self, job).await
    }

    async fn shutdown(&self) {
        self.stop().await;
    }

    fn is_available(&self) -> bool {
        !self.is_closed()
    }

    fn name(&self) -> &'static str {
        "worker-pool"
    }
}

// ============================================================================
// Supervision
// ============================================================================

async fn supervise(
    shared: Arc<PoolShared>,
    id: TaskId,
    job: Job,
    tx: oneshot::Sender<Result<Value>>,
) {
    let queue_timeout = shared.config.queue_timeout;
    let permit = match tokio::time::timeout(queue_timeout, Arc::clone(&shared.permits).acquire_owned())
        .await
    {
        Ok(Ok(permit)) => permit,
        Ok(Err(_)) => {
            let _ = tx.send(Err(Error::PoolClosed));
            return;
        }
        Err(_) => {
            let _ = tx.send(Err(Error::Infrastructure(format!(
                "no worker became free within {} seconds",
                queue_timeout.as_secs()
            ))));
            return;
        }
    };

    if tx.is_closed() {
        debug!(task = %id, "caller gone, skipping task");
        return;
    }

    let mut worker = match shared.checkout().await {
        Ok(worker) => worker,
        Err(e) => {
            let _ = tx.send(Err(e));
            return;
        }
    };

    let limit = job.timeout.unwrap_or(shared.config.task_timeout);
    let result = worker.run(id, job, limit).await;

    let counters = &shared.counters;
    match &result {
        Ok(_) => counters.completed.fetch_add(1, Ordering::Relaxed),
        Err(Error::Timeout(_)) => counters.timeouts.fetch_add(1, Ordering::Relaxed),
        Err(_) => counters.failed.fetch_add(1, Ordering::Relaxed),
    };
    if let Err(e) = &result {
        debug!(task = %id, pid = worker.pid(), error = %e, "task failed");
    }

    let _ = tx.send(result);
    shared.checkin(worker).await;
    drop(permit);
}

impl PoolShared {
    /// Take a live idle worker, or spawn a new one
    async fn checkout(&self) -> Result<WorkerProcess> {
        loop {
            let candidate = self.idle.lock().pop();
            let Some(mut worker) = candidate else {
                break;
            };
            if !worker.has_exited() {
                return Ok(worker);
            }
            warn!(pid = worker.pid(), "idle worker died, discarding");
            self.counters.killed.fetch_add(1, Ordering::Relaxed);
        }

        let worker = WorkerProcess::spawn(&self.command, &self.config).await?;
        self.counters.spawned.fetch_add(1, Ordering::Relaxed);
        Ok(worker)
    }

    /// Return a worker after a task: park it idle, or replace it
    ///
    /// Runs before the task's permit is released, so a killed or recycled
    /// worker is replaced before the slot becomes available again.
    async fn checkin(&self, mut worker: WorkerProcess) {
        if worker.state().is_terminal() {
            self.counters.killed.fetch_add(1, Ordering::Relaxed);
            self.replace().await;
            return;
        }

        let max_tasks = self.config.max_tasks_per_worker;
        if max_tasks > 0 && worker.tasks_completed() >= max_tasks {
            debug!(pid = worker.pid(), tasks = worker.tasks_completed(), "recycling worker");
            self.counters.retired.fetch_add(1, Ordering::Relaxed);
            tokio::spawn(worker.retire());
            self.replace().await;
            return;
        }

        worker.reset();
        if let Some(mut worker) = self.park(worker) {
            worker.kill().await;
        }
    }

    /// Spawn a fresh worker into the idle set
    ///
    /// A failed spawn is only logged; the next checkout tries again and
    /// reports the error to its caller.
    async fn replace(&self) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        match WorkerProcess::spawn(&self.command, &self.config).await {
            Ok(worker) => {
                self.counters.spawned.fetch_add(1, Ordering::Relaxed);
                debug!(pid = worker.pid(), "replacement worker ready");
                if let Some(mut worker) = self.park(worker) {
                    worker.kill().await;
                }
            }
            Err(e) => warn!(error = %e, "failed to spawn replacement worker"),
        }
    }

    /// Push onto the idle set; hands the worker back if the pool closed
    fn park(&self, worker: WorkerProcess) -> Option<WorkerProcess> {
        let mut idle = self.idle.lock();
        if self.closed.load(Ordering::SeqCst) {
            Some(worker)
        } else {
            idle.push(worker);
            None
        }
    }
}
