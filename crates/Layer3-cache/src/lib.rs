//! # docpool-cache
//!
//! Layer3 - 파서 캐시 facade
//!
//! - `ParserCache`: LRU + in-flight 중복 제거 + worker dispatch
//! - `InFlightRegistry`: key 별 leader/follower, worker pid 추적
//! - `Dispatcher`: timeout / worker 종료 에러 메시지 재작성
//! - `handlers`: worker 프로세스에서 실행되는 파서 작업
//!
//! ## 사용 예시
//!
//! ```ignore
//! let cache = ParserCache::new(&DocpoolConfig::default(), WorkerCommand::current_exe()?.arg("worker"));
//! let doc = cache.get_document_parser_for(&response, true).await?;
//! let (refs, re_refs) = doc.references();
//! cache.shutdown().await;
//! ```

pub mod dispatcher;
pub mod handlers;
pub mod parser_cache;
pub mod registry;
pub mod stats;

pub use dispatcher::Dispatcher;
pub use handlers::{run_standard_worker, worker_runtime, OP_PARSE_DOCUMENT, OP_TAGS_BY_FILTER};
pub use parser_cache::ParserCache;
pub use registry::{Claim, InFlightRegistry, LeaderGuard, Waited, Waiter};
pub use stats::CacheStats;
