//! Executor trait

use crate::task::Job;
use async_trait::async_trait;
use docpool_foundation::Result;
use serde_json::Value;

/// Executor trait - implement to add new execution backends
///
/// The parser cache only talks to this trait, so tests can swap the worker
/// pool for an in-process fake.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run a job to completion and return its output
    async fn execute(&self, job: Job) -> Result<Value>;

    /// Stop accepting work and release workers. Idempotent.
    async fn shutdown(&self);

    /// Check if the executor accepts jobs
    fn is_available(&self) -> bool;

    /// Get executor name
    fn name(&self) -> &'static str;
}
