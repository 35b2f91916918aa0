//! Worker side of the pool
//!
//! A worker is any binary that calls [`init_worker`] and then
//! [`WorkerRuntime::serve`] when [`is_worker_process`] is true. It reads
//! [`TaskRequest`] lines from stdin until EOF and answers each with a
//! `Started` and a `Finished` frame.

use crate::protocol::{
    encode_frame, Payload, TaskOutcome, TaskRequest, WorkerMessage, ENV_SPILL_THRESHOLD, ENV_WORKER,
};
use docpool_foundation::config::DEFAULT_SPILL_THRESHOLD;
use docpool_foundation::env_detect::ENV_PARSER_MEMORY_LIMIT;
use docpool_foundation::{Error, ProfilingFlags, RemoteError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;
use tracing::{debug, info, info_span, warn};
use tracing_subscriber::EnvFilter;

/// Log filter for worker processes (`EnvFilter` syntax, default `info`)
pub const ENV_WORKER_LOG: &str = "DOCPOOL_WORKER_LOG";

type Handler = Box<dyn Fn(Value) -> Result<Value>>;

/// Is this process a pool worker?
pub fn is_worker_process() -> bool {
    std::env::var(ENV_WORKER).map(|v| v == "1").unwrap_or(false)
}

/// Process-level worker setup
///
/// - SIGINT is ignored; the parent decides when workers die
/// - logs go to stderr, level first, so the parent can re-emit them
/// - the address space limit from the parent is applied (Linux)
pub fn init_worker() {
    ignore_sigint();

    let filter = EnvFilter::try_from_env(ENV_WORKER_LOG).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .without_time()
        .with_target(false)
        .with_env_filter(filter)
        .try_init();

    let limit = std::env::var(ENV_PARSER_MEMORY_LIMIT)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(0);
    if limit > 0 {
        if let Err(e) = apply_memory_limit(limit) {
            warn!(limit, error = %e, "could not apply worker memory limit");
        }
    }
}

#[cfg(unix)]
fn ignore_sigint() {
    // SAFETY: installing SIG_IGN has no preconditions
    unsafe {
        libc::signal(libc::SIGINT, libc::SIG_IGN);
    }
}

#[cfg(not(unix))]
fn ignore_sigint() {}

/// Cap the address space at current usage + `limit` bytes
#[cfg(target_os = "linux")]
fn apply_memory_limit(limit: u64) -> std::io::Result<()> {
    let statm = std::fs::read_to_string("/proc/self/statm")?;
    let pages: u64 = statm
        .split_whitespace()
        .next()
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "bad /proc/self/statm"))?;

    // SAFETY: sysconf/getrlimit/setrlimit only read or write the struct we pass
    unsafe {
        let page_size = libc::sysconf(libc::_SC_PAGESIZE).max(4096) as u64;
        let mut rlim = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        if libc::getrlimit(libc::RLIMIT_AS, &mut rlim) != 0 {
            return Err(std::io::Error::last_os_error());
        }
        let wanted = (pages * page_size).saturating_add(limit) as libc::rlim_t;
        rlim.rlim_cur = if rlim.rlim_max == libc::RLIM_INFINITY {
            wanted
        } else {
            wanted.min(rlim.rlim_max)
        };
        if libc::setrlimit(libc::RLIMIT_AS, &rlim) != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }

    debug!(limit, "worker memory limit applied");
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn apply_memory_limit(_limit: u64) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "memory limits are only supported on Linux",
    ))
}

/// Peak resident set size in KiB (`VmHWM`)
fn peak_memory_kb() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    status
        .lines()
        .find(|l| l.starts_with("VmHWM:"))
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|v| v.parse().ok())
}

// ============================================================================
// WorkerRuntime
// ============================================================================

/// Handler table + request loop
pub struct WorkerRuntime {
    handlers: HashMap<String, Handler>,
    spill_threshold: usize,
    profiling: ProfilingFlags,
}

impl WorkerRuntime {
    pub fn new() -> Self {
        let spill_threshold = std::env::var(ENV_SPILL_THRESHOLD)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_SPILL_THRESHOLD);

        Self {
            handlers: HashMap::new(),
            spill_threshold,
            profiling: ProfilingFlags::detect(),
        }
    }

    /// Register a handler for `op`
    pub fn handler<F>(mut self, op: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value) -> Result<Value> + 'static,
    {
        self.handlers.insert(op.into(), Box::new(f));
        self
    }

    pub fn with_spill_threshold(mut self, bytes: usize) -> Self {
        self.spill_threshold = bytes;
        self
    }

    pub fn with_profiling(mut self, profiling: ProfilingFlags) -> Self {
        self.profiling = profiling;
        self
    }

    /// Serve on stdin/stdout until the parent closes stdin
    pub fn serve(&self) -> Result<()> {
        let stdin = std::io::stdin();
        let stdout = std::io::stdout();
        self.serve_io(stdin.lock(), stdout.lock())
    }

    pub fn serve_io<R: BufRead, W: Write>(&self, input: R, mut output: W) -> Result<()> {
        let pid = std::process::id();
        write_frame(&mut output, &WorkerMessage::Ready { pid })?;
        if self.profiling.core {
            debug!(pid, handlers = self.handlers.len(), "core profiling enabled");
        }

        for line in input.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let request: TaskRequest = match serde_json::from_str(&line) {
                Ok(request) => request,
                Err(e) => {
                    warn!(error = %e, "malformed task request");
                    continue;
                }
            };

            let id = request.id;
            write_frame(&mut output, &WorkerMessage::Started { id, pid })?;
            let outcome = self.run_task(request);
            write_frame(&mut output, &WorkerMessage::Finished { id, outcome })?;
        }

        debug!(pid, "stdin closed, worker exiting");
        Ok(())
    }

    fn run_task(&self, request: TaskRequest) -> TaskOutcome {
        let TaskRequest { id, op, payload } = request;

        let span = info_span!("task", id = %id, op = %op);
        let _entered = self.profiling.trace.then(|| span.enter());

        let started = Instant::now();
        let result = payload
            .unpack()
            .and_then(|input| self.call(&op, input))
            .and_then(|output| Payload::pack(output, self.spill_threshold));

        if self.profiling.cpu {
            info!(op = %op, elapsed_ms = started.elapsed().as_millis() as u64, "cpu profile");
        }
        if self.profiling.memory {
            if let Some(peak_kb) = peak_memory_kb() {
                info!(op = %op, peak_kb, "memory profile");
            }
        }

        match result {
            Ok(payload) => TaskOutcome::Success { payload },
            Err(e) => TaskOutcome::Failure {
                error: e.to_remote(),
            },
        }
    }

    fn call(&self, op: &str, input: Value) -> Result<Value> {
        let handler = self
            .handlers
            .get(op)
            .ok_or_else(|| Error::InvalidInput(format!("unknown worker operation: {}", op)))?;

        match catch_unwind(AssertUnwindSafe(|| handler(input))) {
            Ok(result) => result,
            Err(panic) => Err(Error::Remote(RemoteError::from_panic(panic.as_ref()))),
        }
    }
}

impl Default for WorkerRuntime {
    fn default() -> Self {
        Self::new()
    }
}

fn write_frame<W: Write>(output: &mut W, message: &WorkerMessage) -> Result<()> {
    output.write_all(encode_frame(message)?.as_bytes())?;
    output.flush()?;
    Ok(())
}
