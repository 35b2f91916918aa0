//! Config - 통합 설정 관리
//!
//! - `docpool.rs` - DocpoolConfig (cache + pool 설정)

mod docpool;

pub use docpool::{
    CacheSettings, DocpoolConfig, PoolSettings, CI_MAX_WORKERS, DEFAULT_CACHE_SIZE,
    DEFAULT_MAX_CACHEABLE_BODY_LEN, DEFAULT_MAX_TASKS_PER_WORKER, DEFAULT_MEMORY_LIMIT,
    DEFAULT_PARSER_TIMEOUT_SECS, DEFAULT_QUEUE_TIMEOUT_SECS, DEFAULT_SPILL_THRESHOLD,
    DEFAULT_STARTUP_TIMEOUT_SECS, DOCPOOL_CONFIG_FILE, PROFILING_PARSER_TIMEOUT_SECS,
};
