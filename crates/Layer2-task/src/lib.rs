//! # docpool-task
//!
//! Out-of-process worker pool for docpool.
//! 신뢰할 수 없는 입력을 다루는 작업을 별도 프로세스에서 실행하고,
//! 시간 제한을 넘긴 worker는 강제 종료한다.
//!
//! ## Features
//!
//! - Bounded pool of worker processes (`WorkerPool`)
//! - Hard per-task timeout, enforced by killing the worker
//! - Worker recycling after N tasks
//! - Crash detection (`Error::WorkerDied`) with automatic replacement
//! - Error fidelity across the process boundary (`RemoteError`)
//! - Large payloads spilled to temp files
//!
//! ## Worker side
//!
//! ```ignore
//! if docpool_task::is_worker_process() {
//!     docpool_task::init_worker();
//!     return docpool_task::WorkerRuntime::new()
//!         .handler("echo", Ok)
//!         .serve();
//! }
//! ```

pub mod executor;
pub mod pool;
pub mod protocol;
pub mod state;
pub mod task;
pub mod worker;

// Execution
pub use executor::{Executor, WorkerCommand, WorkerProcess};
pub use pool::{PoolConfig, PoolStats, WorkerPool};
pub use state::WorkerState;
pub use task::{Job, StartHook, TaskHandle, TaskId};

// Worker side
pub use worker::{init_worker, is_worker_process, WorkerRuntime, ENV_WORKER_LOG};
