//! Error types for docpool
//!
//! 모든 에러를 중앙에서 관리. Worker 프로세스에서 발생한 에러도
//! [`RemoteError`] 봉투를 거쳐 같은 타입으로 복원된다.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// docpool 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // 설정 관련
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // 파싱 관련 (호출자가 로컬에서 복구 가능)
    // ========================================================================
    #[error("{0}")]
    UnsupportedContent(String),

    #[error("Parse failure: {0}")]
    ParseFailure(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ========================================================================
    // 실행 관련
    // ========================================================================
    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    WorkerDied(String),

    #[error("{0}")]
    Remote(RemoteError),

    // ========================================================================
    // 인프라 관련 (복구 불가, 전파해야 함)
    // ========================================================================
    #[error("Infrastructure error: {0}")]
    Infrastructure(String),

    #[error("Worker pool is closed")]
    PoolClosed,

    // ========================================================================
    // 외부 에러 변환
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // 기타
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// "No parser" class: the caller should skip this response and move on.
    ///
    /// Timeouts and dead workers are reported in the same class as
    /// unsupported content since callers cannot act differently on them.
    pub fn is_no_parser(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedContent(_) | Error::Timeout(_) | Error::WorkerDied(_)
        )
    }

    /// 호출자가 로컬에서 복구 가능한 에러인지 확인
    pub fn is_recoverable(&self) -> bool {
        !self.is_infrastructure()
    }

    /// The cache itself is unusable; abort the calling operation.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Error::Infrastructure(_) | Error::PoolClosed | Error::Io(_)
        )
    }

    /// Stable kind name, used as the `kind` of a [`RemoteError`].
    pub fn kind(&self) -> &str {
        match self {
            Error::Config(_) => "Config",
            Error::UnsupportedContent(_) => "UnsupportedContent",
            Error::ParseFailure(_) => "ParseFailure",
            Error::InvalidInput(_) => "InvalidInput",
            Error::Timeout(_) => "Timeout",
            Error::WorkerDied(_) => "WorkerDied",
            Error::Remote(remote) => &remote.kind,
            Error::Infrastructure(_) => "Infrastructure",
            Error::PoolClosed => "PoolClosed",
            Error::Io(_) => "Io",
            Error::Json(_) => "Json",
            Error::Internal(_) => "Internal",
        }
    }

    /// Wrap this error into an envelope that can cross the process boundary.
    pub fn to_remote(&self) -> RemoteError {
        match self {
            Error::Remote(remote) => remote.clone(),
            other => RemoteError::new(other.kind(), other.message()),
        }
    }

    /// Rebuild an error from its envelope.
    ///
    /// Known kinds come back as the same variant; anything else is kept as
    /// [`Error::Remote`] so the original kind and message stay visible.
    pub fn from_remote(remote: RemoteError) -> Self {
        if let Some(trace) = &remote.trace {
            debug!(kind = %remote.kind, "worker error trace:\n{}", trace);
        }

        let message = remote.message.clone();
        match remote.kind.as_str() {
            "Config" => Error::Config(message),
            "UnsupportedContent" => Error::UnsupportedContent(message),
            "ParseFailure" => Error::ParseFailure(message),
            "InvalidInput" => Error::InvalidInput(message),
            "Timeout" => Error::Timeout(message),
            "WorkerDied" => Error::WorkerDied(message),
            "Internal" => Error::Internal(message),
            _ => Error::Remote(remote),
        }
    }

    /// Copy of this error for another waiter on the same outcome.
    ///
    /// `Io` and `Json` are not `Clone`; they come back as `Infrastructure`
    /// and `Internal` with the same message.
    pub fn duplicate(&self) -> Self {
        match self {
            Error::Config(m) => Error::Config(m.clone()),
            Error::UnsupportedContent(m) => Error::UnsupportedContent(m.clone()),
            Error::ParseFailure(m) => Error::ParseFailure(m.clone()),
            Error::InvalidInput(m) => Error::InvalidInput(m.clone()),
            Error::Timeout(m) => Error::Timeout(m.clone()),
            Error::WorkerDied(m) => Error::WorkerDied(m.clone()),
            Error::Remote(r) => Error::Remote(r.clone()),
            Error::Infrastructure(m) => Error::Infrastructure(m.clone()),
            Error::PoolClosed => Error::PoolClosed,
            Error::Io(e) => Error::Infrastructure(format!("IO error: {}", e)),
            Error::Json(e) => Error::Internal(format!("JSON error: {}", e)),
            Error::Internal(m) => Error::Internal(m.clone()),
        }
    }

    /// Message without the variant prefix added by `Display`.
    fn message(&self) -> String {
        match self {
            Error::Config(m)
            | Error::UnsupportedContent(m)
            | Error::ParseFailure(m)
            | Error::InvalidInput(m)
            | Error::Timeout(m)
            | Error::WorkerDied(m)
            | Error::Infrastructure(m)
            | Error::Internal(m) => m.clone(),
            Error::Remote(r) => r.message.clone(),
            other => other.to_string(),
        }
    }

    /// Unsupported content 에러 생성 헬퍼
    pub fn unsupported(message: impl Into<String>) -> Self {
        Error::UnsupportedContent(message.into())
    }

    /// Parse failure 에러 생성 헬퍼
    pub fn parse_failure(message: impl Into<String>) -> Self {
        Error::ParseFailure(message.into())
    }
}

/// Serialized form of an error raised inside a worker process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    /// Error kind, e.g. `ParseFailure` or a handler-defined name
    pub kind: String,
    /// Human readable message
    pub message: String,
    /// Backtrace text captured in the worker, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

impl RemoteError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            trace: None,
        }
    }

    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = Some(trace.into());
        self
    }

    /// Envelope for a panic payload caught with `catch_unwind`.
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "worker handler panicked".to_string()
        };
        Self::new("Panic", message)
    }
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl From<RemoteError> for Error {
    fn from(remote: RemoteError) -> Self {
        Error::from_remote(remote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_kind_round_trips_to_same_variant() {
        let original = Error::ParseFailure("unexpected end of stream".to_string());
        let restored = Error::from_remote(original.to_remote());

        match restored {
            Error::ParseFailure(msg) => assert_eq!(msg, "unexpected end of stream"),
            other => panic!("expected ParseFailure, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_kind_is_preserved() {
        let restored = Error::from_remote(RemoteError::new("ValueError", "boom"));

        match &restored {
            Error::Remote(remote) => {
                assert_eq!(remote.kind, "ValueError");
                assert_eq!(remote.message, "boom");
            }
            other => panic!("expected Remote, got {:?}", other),
        }
        assert_eq!(restored.kind(), "ValueError");
        assert_eq!(restored.to_string(), "ValueError: boom");
    }

    #[test]
    fn test_error_classes() {
        assert!(Error::unsupported("There is no parser for images.").is_no_parser());
        assert!(Error::Timeout("slow".into()).is_no_parser());
        assert!(Error::WorkerDied("gone".into()).is_no_parser());
        assert!(!Error::parse_failure("bad").is_no_parser());

        assert!(Error::PoolClosed.is_infrastructure());
        assert!(!Error::PoolClosed.is_recoverable());
        assert!(Error::parse_failure("bad").is_recoverable());
    }

    #[test]
    fn test_duplicate_keeps_variant_and_message() {
        let err = Error::Timeout("took too long".into());
        match err.duplicate() {
            Error::Timeout(msg) => assert_eq!(msg, "took too long"),
            other => panic!("unexpected {:?}", other),
        }

        let io = Error::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe"));
        assert!(io.duplicate().is_infrastructure());
    }

    #[test]
    fn test_panic_payload() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("index out of bounds");
        let remote = RemoteError::from_panic(payload.as_ref());
        assert_eq!(remote.kind, "Panic");
        assert_eq!(remote.message, "index out of bounds");
    }
}
