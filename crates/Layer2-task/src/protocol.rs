//! Parent ↔ worker wire protocol
//!
//! Newline-delimited JSON. The parent writes [`TaskRequest`] lines to the
//! worker's stdin; the worker answers with [`WorkerMessage`] lines on stdout,
//! each prefixed with [`FRAME_PREFIX`] so that anything else a parsing
//! library prints to stdout is ignored.
//!
//! Payloads larger than the spill threshold travel through a temp file and
//! only the path goes over the pipe. The receiver deletes the file.

use crate::task::TaskId;
use docpool_foundation::{Error, RemoteError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Write;
use std::path::PathBuf;
use tracing::warn;

/// Marks a protocol line on the worker's stdout
pub const FRAME_PREFIX: &str = "@@docpool ";

/// Set to `1` in the environment of every worker process
pub const ENV_WORKER: &str = "DOCPOOL_WORKER";

/// Spill threshold handed from the parent to its workers
pub const ENV_SPILL_THRESHOLD: &str = "DOCPOOL_SPILL_THRESHOLD";

// ============================================================================
// Payload
// ============================================================================

/// JSON value, inline or spilled to a temp file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    Inline { value: Value },
    Spilled { path: PathBuf },
}

impl Payload {
    /// Inline unless the encoded value exceeds `spill_threshold` (0 = never spill)
    pub fn pack(value: Value, spill_threshold: usize) -> Result<Self> {
        if spill_threshold == 0 {
            return Ok(Payload::Inline { value });
        }

        let encoded = serde_json::to_vec(&value)?;
        if encoded.len() <= spill_threshold {
            return Ok(Payload::Inline { value });
        }

        let mut file = tempfile::Builder::new()
            .prefix("docpool-")
            .suffix(".json")
            .tempfile()?;
        file.write_all(&encoded)?;
        file.flush()?;
        let (_, path) = file
            .keep()
            .map_err(|e| Error::Infrastructure(format!("failed to keep spill file: {}", e)))?;

        Ok(Payload::Spilled { path })
    }

    /// Recover the value, deleting the spill file if there was one
    pub fn unpack(self) -> Result<Value> {
        match self {
            Payload::Inline { value } => Ok(value),
            Payload::Spilled { path } => {
                let bytes = std::fs::read(&path)?;
                if let Err(e) = std::fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %e, "failed to remove spill file");
                }
                Ok(serde_json::from_slice(&bytes)?)
            }
        }
    }

    pub fn is_spilled(&self) -> bool {
        matches!(self, Payload::Spilled { .. })
    }

    /// Delete the spill file without reading it
    pub fn discard(self) {
        if let Payload::Spilled { path } = self {
            let _ = std::fs::remove_file(path);
        }
    }
}

// ============================================================================
// Frames
// ============================================================================

/// Parent → worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub id: TaskId,
    pub op: String,
    pub payload: Payload,
}

/// Result of one task inside the worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Success { payload: Payload },
    Failure { error: RemoteError },
}

/// Worker → parent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// Initializer finished, ready for tasks
    Ready { pid: u32 },
    /// First thing sent for every task
    Started { id: TaskId, pid: u32 },
    Finished { id: TaskId, outcome: TaskOutcome },
}

/// Encode one stdout frame, newline included
pub fn encode_frame(message: &WorkerMessage) -> Result<String> {
    Ok(format!("{}{}\n", FRAME_PREFIX, serde_json::to_string(message)?))
}

/// Decode a stdout line; `None` when the line carries no frame
///
/// The prefix may appear mid-line when something else printed without a
/// trailing newline.
pub fn decode_frame(line: &str) -> Option<Result<WorkerMessage>> {
    let start = line.find(FRAME_PREFIX)?;
    let json = line[start + FRAME_PREFIX.len()..].trim_end();
    Some(serde_json::from_str(json).map_err(Error::from))
}

/// Encode one stdin request line, newline included
pub fn encode_request(request: &TaskRequest) -> Result<String> {
    let mut line = serde_json::to_string(request)?;
    line.push('\n');
    Ok(line)
}
