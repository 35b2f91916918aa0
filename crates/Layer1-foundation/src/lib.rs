//! # docpool-foundation
//!
//! Foundation layer for docpool:
//! - Error: 중앙 에러 타입 + 프로세스 경계를 넘는 RemoteError
//! - Config: DocpoolConfig (cache, pool)
//! - Env: 실행 환경 감지 (CI, CPU 수, 프로파일링 플래그)
//! - Cache: CacheKey, LruCache, LruStore (release-on-evict)
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  docpool-cli (worker / parse)                           │
//! │                     │                                   │
//! │  docpool-cache (ParserCache, registry, dispatcher)      │
//! │          ┌─────────┴─────────┐                          │
//! │          ▼                   ▼                          │
//! │   docpool-task         docpool-core                     │
//! │   (WorkerPool)         (parsers, ParsedDocument)        │
//! │          └─────────┬─────────┘                          │
//! │                    ▼                                    │
//! │          docpool-foundation                             │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod config;
pub mod env_detect;
pub mod error;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, RemoteError, Result};

// ============================================================================
// Config (설정)
// ============================================================================
pub use config::{CacheSettings, DocpoolConfig, PoolSettings, DOCPOOL_CONFIG_FILE};

// ============================================================================
// Cache (캐시 시스템)
// ============================================================================
pub use cache::{
    // Key
    compute_key,
    CacheKey,
    // Utilities
    LruCache,
    // Store
    LruStore,
    Releasable,
    StoreStats,
};

// ============================================================================
// Environment Detection (환경 감지)
// ============================================================================
pub use env_detect::{Environment, OsType, ProfilingFlags};
