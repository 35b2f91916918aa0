//! Docpool Config - 캐시와 워커 풀 설정
//!
//! 모든 값은 기본값을 가지며, TOML 파일과 환경 변수로 덮어쓸 수 있다.

use crate::env_detect::Environment;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 설정 파일명
pub const DOCPOOL_CONFIG_FILE: &str = "docpool.toml";

/// LRU capacity
pub const DEFAULT_CACHE_SIZE: usize = 10;
/// Bodies larger than this are parsed but never cached (1 MiB)
pub const DEFAULT_MAX_CACHEABLE_BODY_LEN: usize = 1024 * 1024;
/// Tasks a worker runs before it is recycled
pub const DEFAULT_MAX_TASKS_PER_WORKER: usize = 20;
/// Per-task parser timeout
pub const DEFAULT_PARSER_TIMEOUT_SECS: u64 = 10;
/// Per-task parser timeout while profiling instrumentation is active
pub const PROFILING_PARSER_TIMEOUT_SECS: u64 = 180;
/// Worker address-space headroom (128 MiB)
pub const DEFAULT_MEMORY_LIMIT: u64 = 128 * 1024 * 1024;
/// Payloads above this size go through a temp file (256 KiB)
pub const DEFAULT_SPILL_THRESHOLD: usize = 256 * 1024;
/// Worker handshake timeout
pub const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 10;
/// Pool slot acquisition timeout
pub const DEFAULT_QUEUE_TIMEOUT_SECS: u64 = 60;
/// Worker count used on CI machines
pub const CI_MAX_WORKERS: usize = 2;

// ============================================================================
// Docpool Config (통합)
// ============================================================================

/// docpool 통합 설정
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocpoolConfig {
    /// LRU 캐시 설정
    #[serde(default)]
    pub cache: CacheSettings,

    /// 워커 풀 설정
    #[serde(default)]
    pub pool: PoolSettings,
}

impl DocpoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Load
    // ========================================================================

    /// TOML 파일에서 로드
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// 파일이 없으면 기본값
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache.cache_size == 0 {
            return Err(Error::Config("cache.cache_size must be at least 1".into()));
        }
        if self.pool.max_workers == Some(0) {
            return Err(Error::Config("pool.max_workers must be at least 1".into()));
        }
        if self.pool.max_tasks_per_worker == 0 {
            return Err(Error::Config(
                "pool.max_tasks_per_worker must be at least 1".into(),
            ));
        }
        if self.pool.parser_timeout_secs == Some(0) {
            return Err(Error::Config(
                "pool.parser_timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    // ========================================================================
    // Merge / Env
    // ========================================================================

    /// 다른 설정과 병합 (other가 우선)
    pub fn merge(&mut self, other: DocpoolConfig) {
        self.cache.merge(other.cache);
        self.pool.merge(other.pool);
    }

    /// 환경 변수 오버라이드 적용
    pub fn apply_env(&mut self, env: &Environment) {
        if let Some(limit) = env.parser_memory_limit {
            self.pool.memory_limit = limit;
        }
    }

    // ========================================================================
    // Effective values
    // ========================================================================

    /// Explicit timeout, else 10s (180s while profiling)
    pub fn effective_parser_timeout(&self, env: &Environment) -> Duration {
        match self.pool.parser_timeout_secs {
            Some(secs) => Duration::from_secs(secs),
            None if env.profiling.slows_parsing() => {
                Duration::from_secs(PROFILING_PARSER_TIMEOUT_SECS)
            }
            None => Duration::from_secs(DEFAULT_PARSER_TIMEOUT_SECS),
        }
    }

    /// Explicit worker count, else half the cores (2 on CI)
    pub fn effective_max_workers(&self, env: &Environment) -> usize {
        self.pool
            .max_workers
            .unwrap_or_else(|| env.default_worker_count())
            .max(1)
    }
}

// ============================================================================
// Cache Settings
// ============================================================================

/// LRU 캐시 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// 최대 엔트리 수
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,

    /// 캐시 가능한 최대 body 크기
    #[serde(default = "default_max_cacheable_body_len")]
    pub max_cacheable_body_len: usize,

    /// 바이트 예산 (0 = 무제한)
    #[serde(default)]
    pub max_bytes: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            cache_size: DEFAULT_CACHE_SIZE,
            max_cacheable_body_len: DEFAULT_MAX_CACHEABLE_BODY_LEN,
            max_bytes: 0,
        }
    }
}

impl CacheSettings {
    fn merge(&mut self, other: CacheSettings) {
        if other.cache_size != DEFAULT_CACHE_SIZE {
            self.cache_size = other.cache_size;
        }
        if other.max_cacheable_body_len != DEFAULT_MAX_CACHEABLE_BODY_LEN {
            self.max_cacheable_body_len = other.max_cacheable_body_len;
        }
        if other.max_bytes != 0 {
            self.max_bytes = other.max_bytes;
        }
    }
}

// ============================================================================
// Pool Settings
// ============================================================================

/// 워커 풀 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSettings {
    /// 워커 수 (None = 환경에서 결정)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<usize>,

    /// 워커 재활용 주기
    #[serde(default = "default_max_tasks_per_worker")]
    pub max_tasks_per_worker: usize,

    /// 파서 타임아웃 (None = 환경에서 결정)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parser_timeout_secs: Option<u64>,

    /// 워커 메모리 한도 (0 = 제한 없음)
    #[serde(default = "default_memory_limit")]
    pub memory_limit: u64,

    /// 임시 파일로 넘기는 payload 크기 기준
    #[serde(default = "default_spill_threshold")]
    pub spill_threshold: usize,

    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    #[serde(default = "default_queue_timeout_secs")]
    pub queue_timeout_secs: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_workers: None,
            max_tasks_per_worker: DEFAULT_MAX_TASKS_PER_WORKER,
            parser_timeout_secs: None,
            memory_limit: DEFAULT_MEMORY_LIMIT,
            spill_threshold: DEFAULT_SPILL_THRESHOLD,
            startup_timeout_secs: DEFAULT_STARTUP_TIMEOUT_SECS,
            queue_timeout_secs: DEFAULT_QUEUE_TIMEOUT_SECS,
        }
    }
}

impl PoolSettings {
    fn merge(&mut self, other: PoolSettings) {
        if other.max_workers.is_some() {
            self.max_workers = other.max_workers;
        }
        if other.max_tasks_per_worker != DEFAULT_MAX_TASKS_PER_WORKER {
            self.max_tasks_per_worker = other.max_tasks_per_worker;
        }
        if other.parser_timeout_secs.is_some() {
            self.parser_timeout_secs = other.parser_timeout_secs;
        }
        if other.memory_limit != DEFAULT_MEMORY_LIMIT {
            self.memory_limit = other.memory_limit;
        }
        if other.spill_threshold != DEFAULT_SPILL_THRESHOLD {
            self.spill_threshold = other.spill_threshold;
        }
        if other.startup_timeout_secs != DEFAULT_STARTUP_TIMEOUT_SECS {
            self.startup_timeout_secs = other.startup_timeout_secs;
        }
        if other.queue_timeout_secs != DEFAULT_QUEUE_TIMEOUT_SECS {
            self.queue_timeout_secs = other.queue_timeout_secs;
        }
    }
}

fn default_cache_size() -> usize {
    DEFAULT_CACHE_SIZE
}

fn default_max_cacheable_body_len() -> usize {
    DEFAULT_MAX_CACHEABLE_BODY_LEN
}

fn default_max_tasks_per_worker() -> usize {
    DEFAULT_MAX_TASKS_PER_WORKER
}

fn default_memory_limit() -> u64 {
    DEFAULT_MEMORY_LIMIT
}

fn default_spill_threshold() -> usize {
    DEFAULT_SPILL_THRESHOLD
}

fn default_startup_timeout_secs() -> u64 {
    DEFAULT_STARTUP_TIMEOUT_SECS
}

fn default_queue_timeout_secs() -> u64 {
    DEFAULT_QUEUE_TIMEOUT_SECS
}
