//! ParserCache 통합 테스트 - 실제 `docpool worker` 프로세스 사용
//!
//! `cargo test -p docpool-cli --test cache_test`

use docpool_cache::ParserCache;
use docpool_core::HttpResponse;
use docpool_foundation::{DocpoolConfig, Error};
use docpool_task::WorkerCommand;
use std::sync::Arc;

fn cache() -> ParserCache {
    let command = WorkerCommand::new(env!("CARGO_BIN_EXE_docpool")).arg("worker");
    ParserCache::new(&DocpoolConfig::default(), command)
}

fn html(path: &str, body: &str) -> HttpResponse {
    HttpResponse::from_text(format!("http://example.com{}", path), body).with_content_type("text/html")
}

#[tokio::test(flavor = "multi_thread")]
async fn test_document_roundtrip_through_worker() {
    let cache = cache();
    let resp = html(
        "/dir/",
        "<html><!-- todo: remove --><a href='page.html'>p</a> contact sales@example.com</html>",
    );

    let doc = cache.get_document_parser_for(&resp, true).await.unwrap();
    assert_eq!(doc.parser_name(), "html");
    assert_eq!(doc.comments(), vec![" todo: remove ".to_string()]);

    let (parsed, _re) = doc.references();
    assert_eq!(parsed, vec!["http://example.com/dir/page.html".to_string()]);
    assert_eq!(doc.emails(Some("example.com")), vec!["sales@example.com".to_string()]);
    assert!(doc.emails(Some("other.org")).is_empty());

    let again = cache.get_document_parser_for(&resp, true).await.unwrap();
    assert!(Arc::ptr_eq(&doc, &again));
    assert_eq!(cache.stats().dispatches, 1);

    cache.shutdown().await;
    assert!(doc.is_released());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_worker_errors_keep_their_kind() {
    let cache = cache();

    let broken = HttpResponse::from_text("http://example.com/feed.xml", "<rss><channel></rss>")
        .with_content_type("application/xml");
    let err = cache.get_document_parser_for(&broken, true).await.unwrap_err();
    assert!(matches!(err, Error::ParseFailure(_)), "{:?}", err);
    assert!(!err.is_no_parser());

    let image = HttpResponse::new("http://example.com/a.gif", b"GIF89a....".to_vec())
        .with_content_type("image/gif");
    let err = cache.get_document_parser_for(&image, true).await.unwrap_err();
    assert!(err.is_no_parser());
    assert_eq!(err.to_string(), "There is no parser for images.");

    cache.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_tags_by_filter_through_worker() {
    let cache = cache();
    let resp = html("/", "<html><body><img src='/a.png'><a href='/x'>x</a><img src='/b.png'></body></html>");

    let tags = cache.get_tags_by_filter(&resp, &["img"], false).await.unwrap();
    let sources: Vec<&str> = tags.iter().filter_map(|t| t.attr("src")).collect();
    assert_eq!(sources, vec!["/a.png", "/b.png"]);
    assert!(tags.iter().all(|t| t.text.is_none()));

    let empty = HttpResponse::from_text("http://example.com/", "   ").with_content_type("text/html");
    assert!(cache.get_tags_by_filter(&empty, &["a"], true).await.unwrap().is_empty());

    cache.shutdown().await;
    assert!(matches!(
        cache.get_tags_by_filter(&resp, &["a"], true).await,
        Err(Error::PoolClosed)
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_callers_share_one_parse() {
    let cache = Arc::new(cache());
    let resp = html("/shared", "<html><a href='/one'>one</a></html>");

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let resp = resp.clone();
            tokio::spawn(async move { cache.get_document_parser_for(&resp, true).await })
        })
        .collect();

    let mut docs = Vec::new();
    for handle in handles {
        docs.push(handle.await.unwrap().unwrap());
    }
    assert!(docs.iter().all(|d| Arc::ptr_eq(d, &docs[0])));
    assert_eq!(cache.stats().dispatches, 1);

    cache.shutdown().await;
}
