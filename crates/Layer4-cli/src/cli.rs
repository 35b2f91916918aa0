//! `docpool parse` - run a file through the parser cache

use clap::Args;
use docpool_cache::{CacheStats, ParserCache};
use docpool_core::{DocumentData, HttpResponse, Tag};
use docpool_foundation::DocpoolConfig;
use docpool_task::WorkerCommand;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Args, Debug)]
pub struct ParseArgs {
    /// File holding the response body
    pub file: PathBuf,

    /// URL the body was fetched from
    #[arg(long, default_value = "http://localhost/")]
    pub url: String,

    /// Content type, e.g. `text/html; charset=utf-8` (sniffed when absent)
    #[arg(long)]
    pub content_type: Option<String>,

    /// Also list these tags (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub tags: Vec<String>,

    /// Include tag text
    #[arg(long)]
    pub text: bool,

    /// Query the cache this many times
    #[arg(long, default_value_t = 1)]
    pub repeat: usize,

    /// Bypass the LRU cache
    #[arg(long)]
    pub no_cache: bool,
}

#[derive(Serialize)]
struct ParseReport<'a> {
    document: Option<&'a DocumentData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<Vec<Tag>>,
    stats: CacheStats,
}

pub async fn run_parse(config: DocpoolConfig, args: ParseArgs) -> anyhow::Result<()> {
    let body = std::fs::read(&args.file)?;
    let mut response = HttpResponse::new(args.url.clone(), body);
    if let Some(content_type) = &args.content_type {
        response = response.with_content_type(content_type.clone());
    }

    let command = WorkerCommand::current_exe()?.arg("worker");
    let cache = ParserCache::new(&config, command);

    let result = parse(&cache, &response, &args).await;
    cache.shutdown().await;
    result
}

async fn parse(cache: &ParserCache, response: &HttpResponse, args: &ParseArgs) -> anyhow::Result<()> {
    let mut document = None;
    for _ in 0..args.repeat.max(1) {
        match cache.get_document_parser_for(response, !args.no_cache).await {
            Ok(doc) => document = Some(doc),
            Err(e) if e.is_no_parser() => {
                warn!("{}", e);
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    let tags = if args.tags.is_empty() {
        None
    } else {
        let names: Vec<&str> = args.tags.iter().map(String::as_str).collect();
        Some(cache.get_tags_by_filter(response, &names, args.text).await?)
    };

    let snapshot = document.as_ref().and_then(|d| d.snapshot());
    let stats = cache.stats();
    info!(%stats, "done");

    let report = ParseReport {
        document: snapshot.as_deref(),
        tags,
        stats,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
