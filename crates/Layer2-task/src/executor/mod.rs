//! Task executors
//!
//! - `Executor` - 실행 백엔드 trait
//! - `WorkerProcess` - 하나의 worker 자식 프로세스 (spawn, run, kill, retire)
//! - `WorkerCommand` - worker를 띄우는 명령어

pub mod process;
pub mod r#trait;

pub use process::{WorkerCommand, WorkerProcess};
pub use r#trait::Executor;
