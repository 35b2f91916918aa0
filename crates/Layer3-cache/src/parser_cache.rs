//! Parser cache facade
//!
//! ```text
//! get_document_parser_for(resp, cache)
//!   │ key = compute_key(url, body)
//!   ├─ cacheable? ── LRU hit ──────────────────────────▶ Arc<ParsedDocument>
//!   ▼
//! claim(key) ── follower ── wait for leader ───────────▶ same outcome
//!   │ leader
//!   ├─ LRU re-check
//!   ├─ dispatch to worker pool (timeout, pid tracking)
//!   ├─ cacheable success → LRU put (evicted docs released)
//!   └─ publish to followers, guard drops the registry entry
//! ```

use crate::dispatcher::Dispatcher;
use crate::handlers::{parse_payload, tags_payload, OP_PARSE_DOCUMENT, OP_TAGS_BY_FILTER};
use crate::registry::{Claim, InFlightRegistry, Waited};
use crate::stats::CacheStats;
use docpool_core::{DocumentData, HttpResponse, ParsedDocument, Tag};
use docpool_foundation::{
    compute_key, CacheKey, CacheSettings, DocpoolConfig, Environment, Error, LruStore, Result,
};
use docpool_task::{Executor, PoolConfig, WorkerCommand, WorkerPool};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Extra time a follower waits beyond the parser timeout
const FOLLOWER_GRACE: Duration = Duration::from_secs(5);

#[derive(Default)]
struct Counters {
    total: AtomicU64,
    do_not_cache: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    waits: AtomicU64,
    tag_queries: AtomicU64,
}

/// Document parser cache backed by an out-of-process worker pool
pub struct ParserCache {
    settings: CacheSettings,
    lru: LruStore<ParsedDocument>,
    documents: InFlightRegistry<Arc<ParsedDocument>>,
    tags: InFlightRegistry<Vec<Tag>>,
    dispatcher: Dispatcher,
    counters: Counters,
    closed: AtomicBool,
}

impl ParserCache {
    /// Cache backed by a [`WorkerPool`] running `command`
    ///
    /// The environment is detected here; the pool starts on first use.
    pub fn new(config: &DocpoolConfig, command: WorkerCommand) -> Self {
        let env = Environment::detect();
        let mut config = config.clone();
        config.apply_env(&env);

        let pool = WorkerPool::new(command, PoolConfig::from_settings(&config, &env));
        Self::with_executor(&config, &env, Arc::new(pool))
    }

    pub fn with_executor(
        config: &DocpoolConfig,
        env: &Environment,
        executor: Arc<dyn Executor>,
    ) -> Self {
        let settings = config.cache.clone();
        let timeout = config.effective_parser_timeout(env);

        info!(
            cache_size = settings.cache_size,
            max_cacheable_body_len = settings.max_cacheable_body_len,
            timeout_secs = timeout.as_secs(),
            executor = executor.name(),
            "parser cache created"
        );

        Self {
            lru: LruStore::with_memory_limit(settings.cache_size, settings.max_bytes),
            documents: InFlightRegistry::new(),
            tags: InFlightRegistry::new(),
            dispatcher: Dispatcher::new(executor, timeout),
            counters: Counters::default(),
            closed: AtomicBool::new(false),
            settings,
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Parsed document for `response`, from the LRU or a worker
    ///
    /// With `cache == false`, or a body larger than `max_cacheable_body_len`,
    /// the LRU is neither read nor written. Concurrent calls for the same
    /// response still share one parse.
    pub async fn get_document_parser_for(
        &self,
        response: &HttpResponse,
        cache: bool,
    ) -> Result<Arc<ParsedDocument>> {
        self.ensure_open()?;
        self.counters.total.fetch_add(1, Ordering::Relaxed);

        let key = compute_key(&response.url, &response.body);
        let cacheable = cache && response.body_len() <= self.settings.max_cacheable_body_len;

        if !cacheable {
            self.counters.do_not_cache.fetch_add(1, Ordering::Relaxed);
        } else if let Some(document) = self.lru.get(&key) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, url = %response.url, "parser cache hit");
            return Ok(document);
        } else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
        }

        loop {
            match self.documents.claim(key) {
                Claim::Leader(guard) => {
                    if cacheable {
                        if let Some(document) = self.lru.get(&key) {
                            return guard.publish(Ok(document));
                        }
                    }

                    let result = self
                        .dispatcher
                        .dispatch::<DocumentData, _>(
                            &guard,
                            OP_PARSE_DOCUMENT,
                            &response.url,
                            parse_payload(response)?,
                        )
                        .await
                        .map(|data| Arc::new(ParsedDocument::new(data)));

                    if let (true, Ok(document)) = (cacheable, &result) {
                        self.lru.put(key, Arc::clone(document));
                    }
                    return guard.publish(result);
                }
                Claim::Follower(waiter) => {
                    self.counters.waits.fetch_add(1, Ordering::Relaxed);
                    match waiter.wait(self.follower_timeout()).await {
                        Waited::Done(result) => return result,
                        Waited::Abandoned => continue,
                        Waited::TimedOut => return Err(self.follower_timed_out(key, &response.url)),
                    }
                }
            }
        }
    }

    /// Tags named in `tags`, in document order
    ///
    /// Never cached. Unsupported content, parse failures, timeouts and dead
    /// workers all yield an empty list; only infrastructure errors are
    /// returned.
    pub async fn get_tags_by_filter(
        &self,
        response: &HttpResponse,
        tags: &[&str],
        yield_text: bool,
    ) -> Result<Vec<Tag>> {
        self.ensure_open()?;
        self.counters.tag_queries.fetch_add(1, Ordering::Relaxed);

        let names: Vec<String> = tags.iter().map(|t| t.to_ascii_lowercase()).collect();
        let filter = format!("{}|{}", names.join(","), yield_text);
        let key = compute_key(&response.url, &response.body).mix(filter.as_bytes());

        let result = loop {
            match self.tags.claim(key) {
                Claim::Leader(guard) => {
                    let payload = tags_payload(response, &names, yield_text)?;
                    let result = self
                        .dispatcher
                        .dispatch::<Vec<Tag>, _>(&guard, OP_TAGS_BY_FILTER, &response.url, payload)
                        .await;
                    break guard.publish(result);
                }
                Claim::Follower(waiter) => {
                    self.counters.waits.fetch_add(1, Ordering::Relaxed);
                    match waiter.wait(self.follower_timeout()).await {
                        Waited::Done(result) => break result,
                        Waited::Abandoned => continue,
                        Waited::TimedOut => break Err(self.follower_timed_out(key, &response.url)),
                    }
                }
            }
        };

        match result {
            Ok(tags) => Ok(tags),
            Err(e) if e.is_infrastructure() => Err(e),
            Err(e) => {
                debug!(url = %response.url, error = %e, "tag filter failed, returning no tags");
                Ok(Vec::new())
            }
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    pub fn stats(&self) -> CacheStats {
        let c = &self.counters;
        let lru = self.lru.stats();
        CacheStats {
            total_queries: c.total.load(Ordering::Relaxed),
            do_not_cache: c.do_not_cache.load(Ordering::Relaxed),
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            inflight_waits: c.waits.load(Ordering::Relaxed),
            tag_queries: c.tag_queries.load(Ordering::Relaxed),
            lru_entries: lru.entries,
            lru_peak: lru.peak_entries,
            lru_capacity: lru.capacity,
            evictions: lru.evictions,
            dispatches: self.dispatcher.dispatches(),
            timeouts: self.dispatcher.timeouts(),
            worker_deaths: self.dispatcher.worker_deaths(),
        }
    }

    /// Stop the workers and release every cached document. Idempotent.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.dispatcher.executor().shutdown().await;
        self.lru.clear();
        info!(stats = %self.stats(), "parser cache shut down");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::PoolClosed)
        } else {
            Ok(())
        }
    }

    fn follower_timeout(&self) -> Duration {
        self.dispatcher.timeout() + FOLLOWER_GRACE
    }

    fn follower_timed_out(&self, key: CacheKey, url: &str) -> Error {
        Error::Timeout(format!(
            "[timeout] Waited more than {} seconds for another parse of \"{}\" (key {})",
            self.follower_timeout().as_secs(),
            url,
            key
        ))
    }
}

impl std::fmt::Debug for ParserCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserCache")
            .field("settings", &self.settings)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docpool_core::ParserRegistry;
    use docpool_task::Job;
    use serde_json::Value;
    use std::sync::atomic::AtomicUsize;

    /// In-process stand-in for the worker pool
    struct FakeExecutor {
        registry: ParserRegistry,
        calls: AtomicUsize,
        delay: Duration,
        failure: Option<fn() -> Error>,
        stopped: AtomicBool,
    }

    impl FakeExecutor {
        fn new() -> Self {
            Self {
                registry: ParserRegistry::standard(),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
                failure: None,
                stopped: AtomicBool::new(false),
            }
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn failing(mut self, failure: fn() -> Error) -> Self {
            self.failure = Some(failure);
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Executor for FakeExecutor {
        async fn execute(&self, mut job: Job) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(hook) = job.on_start.take() {
                hook(4242);
            }
            tokio::time::sleep(self.delay).await;
            if let Some(failure) = self.failure {
                return Err(failure());
            }

            let response: HttpResponse = serde_json::from_value(job.payload["response"].clone())?;
            match job.op.as_str() {
                OP_PARSE_DOCUMENT => Ok(serde_json::to_value(self.registry.parse(&response)?)?),
                OP_TAGS_BY_FILTER => {
                    let names: Vec<String> = serde_json::from_value(job.payload["tags"].clone())?;
                    let yield_text = job.payload["yield_text"].as_bool().unwrap_or(false);
                    let tags = self.registry.tags_by_filter(&response, &names, yield_text)?;
                    Ok(serde_json::to_value(tags)?)
                }
                other => Err(Error::InvalidInput(format!("unknown op {}", other))),
            }
        }

        async fn shutdown(&self) {
            self.stopped.store(true, Ordering::SeqCst);
        }

        fn is_available(&self) -> bool {
            !self.stopped.load(Ordering::SeqCst)
        }

        fn name(&self) -> &'static str {
            "fake"
        }
    }

    fn env() -> Environment {
        Environment::from_lookup(4, |_| None)
    }

    fn cache_with(config: &DocpoolConfig, executor: FakeExecutor) -> (Arc<ParserCache>, Arc<FakeExecutor>) {
        let executor = Arc::new(executor);
        let cache = ParserCache::with_executor(config, &env(), executor.clone());
        (Arc::new(cache), executor)
    }

    fn page(n: usize) -> HttpResponse {
        HttpResponse::from_text(
            format!("http://example.com/{}", n),
            &format!("<html><title>page {}</title><a href='/next'>next</a></html>", n),
        )
        .with_content_type("text/html")
    }

    #[tokio::test]
    async fn test_hit_returns_same_document() {
        let (cache, executor) = cache_with(&DocpoolConfig::default(), FakeExecutor::new());

        let first = cache.get_document_parser_for(&page(1), true).await.unwrap();
        let second = cache.get_document_parser_for(&page(1), true).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.title().as_deref(), Some("page 1"));
        assert_eq!(executor.calls(), 1);

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.dispatches), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_uncacheable_requests_skip_lru() {
        let mut config = DocpoolConfig::default();
        config.cache.max_cacheable_body_len = 16;
        let (cache, executor) = cache_with(&config, FakeExecutor::new());

        // cache=false
        let small = HttpResponse::from_text("http://example.com/s", "<a href='/x'>").with_content_type("text/html");
        cache.get_document_parser_for(&small, false).await.unwrap();
        cache.get_document_parser_for(&small, false).await.unwrap();

        // body above the threshold
        cache.get_document_parser_for(&page(1), true).await.unwrap();
        cache.get_document_parser_for(&page(1), true).await.unwrap();

        assert_eq!(executor.calls(), 4);
        let stats = cache.stats();
        assert_eq!(stats.do_not_cache, 4);
        assert_eq!(stats.lru_entries, 0);
    }

    #[tokio::test]
    async fn test_eviction_releases_document() {
        let mut config = DocpoolConfig::default();
        config.cache.cache_size = 2;
        let (cache, _) = cache_with(&config, FakeExecutor::new());

        let oldest = cache.get_document_parser_for(&page(0), true).await.unwrap();
        for n in 1..=2 {
            cache.get_document_parser_for(&page(n), true).await.unwrap();
        }

        assert!(oldest.is_released());
        assert!(oldest.title().is_none());
        let stats = cache.stats();
        assert_eq!(stats.lru_entries, 2);
        assert_eq!(stats.evictions, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_identical_requests_parse_once() {
        let executor = FakeExecutor::new().slow(Duration::from_millis(200));
        let (cache, executor) = cache_with(&DocpoolConfig::default(), executor);

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get_document_parser_for(&page(7), true).await })
            })
            .collect();

        let mut documents = Vec::new();
        for handle in handles {
            documents.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(executor.calls(), 1);
        assert!(documents.iter().all(|d| Arc::ptr_eq(d, &documents[0])));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_followers_share_leader_error() {
        let executor = FakeExecutor::new()
            .slow(Duration::from_millis(200))
            .failing(|| Error::parse_failure("mismatched tag"));
        let (cache, executor) = cache_with(&DocpoolConfig::default(), executor);

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get_document_parser_for(&page(3), true).await })
            })
            .collect();

        for handle in handles {
            match handle.await.unwrap() {
                Err(Error::ParseFailure(m)) => assert_eq!(m, "mismatched tag"),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(executor.calls(), 1);
        assert_eq!(cache.stats().lru_entries, 0);
    }

    #[tokio::test]
    async fn test_timeout_message_names_pid() {
        let executor = FakeExecutor::new().failing(|| Error::Timeout("task took too long".into()));
        let (cache, _) = cache_with(&DocpoolConfig::default(), executor);

        let err = cache.get_document_parser_for(&page(1), true).await.unwrap_err();
        assert!(err.is_no_parser());
        let message = err.to_string();
        assert!(message.starts_with("[timeout] The parser took more than 10 seconds"), "{}", message);
        assert!(message.contains("\"http://example.com/1\""), "{}", message);
        assert!(message.ends_with("killed it! (pid 4242)"), "{}", message);
        assert_eq!(cache.stats().timeouts, 1);

        // tags: timeout → []
        let tags = cache.get_tags_by_filter(&page(1), &["a"], false).await.unwrap();
        assert!(tags.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_content() {
        let (cache, _) = cache_with(&DocpoolConfig::default(), FakeExecutor::new());
        let image = HttpResponse::new("http://example.com/x.png", b"\x89PNG\r\n".to_vec())
            .with_content_type("image/png");

        let err = cache.get_document_parser_for(&image, true).await.unwrap_err();
        assert!(err.is_no_parser());
        assert_eq!(err.to_string(), docpool_core::NO_PARSER_FOR_IMAGES);

        assert!(cache.get_tags_by_filter(&image, &["a"], true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tags_by_filter() {
        let (cache, executor) = cache_with(&DocpoolConfig::default(), FakeExecutor::new());

        let tags = cache.get_tags_by_filter(&page(1), &["A", "title"], true).await.unwrap();
        let names: Vec<&str> = tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["title", "a"]);
        assert_eq!(tags[1].attr("href"), Some("/next"));
        assert_eq!(tags[1].text.as_deref(), Some("next"));

        // never cached
        cache.get_tags_by_filter(&page(1), &["a"], true).await.unwrap();
        assert_eq!(executor.calls(), 2);
        assert_eq!(cache.stats().lru_entries, 0);
    }

    #[tokio::test]
    async fn test_infrastructure_errors_propagate_from_tags() {
        let executor = FakeExecutor::new().failing(|| Error::Infrastructure("pool cannot start".into()));
        let (cache, _) = cache_with(&DocpoolConfig::default(), executor);

        assert!(cache
            .get_tags_by_filter(&page(1), &["a"], false)
            .await
            .unwrap_err()
            .is_infrastructure());
        assert!(cache
            .get_document_parser_for(&page(1), true)
            .await
            .unwrap_err()
            .is_infrastructure());
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent_and_releases() {
        let (cache, executor) = cache_with(&DocpoolConfig::default(), FakeExecutor::new());
        let doc = cache.get_document_parser_for(&page(1), true).await.unwrap();

        cache.shutdown().await;
        cache.shutdown().await;

        assert!(doc.is_released());
        assert!(!executor.is_available());
        assert!(matches!(
            cache.get_document_parser_for(&page(1), true).await,
            Err(Error::PoolClosed)
        ));
    }
}
