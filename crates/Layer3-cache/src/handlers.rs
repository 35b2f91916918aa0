//! Worker-side operations
//!
//! The parent sends an [`HttpResponse`] (plus a tag filter for
//! `get_tags_by_filter`); the worker runs the parser registry on it and
//! returns `DocumentData` or `Vec<Tag>` as JSON.

use docpool_core::{HttpResponse, ParserRegistry};
use docpool_foundation::Result;
use docpool_task::{init_worker, WorkerRuntime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

pub const OP_PARSE_DOCUMENT: &str = "parse_document";
pub const OP_TAGS_BY_FILTER: &str = "get_tags_by_filter";

#[derive(Serialize)]
struct ParseArgs<'a> {
    response: &'a HttpResponse,
}

#[derive(Deserialize)]
struct ParseInput {
    response: HttpResponse,
}

#[derive(Serialize)]
struct TagsArgs<'a> {
    response: &'a HttpResponse,
    tags: &'a [String],
    yield_text: bool,
}

#[derive(Deserialize)]
struct TagsInput {
    response: HttpResponse,
    tags: Vec<String>,
    yield_text: bool,
}

pub(crate) fn parse_payload(response: &HttpResponse) -> Result<Value> {
    Ok(serde_json::to_value(ParseArgs { response })?)
}

pub(crate) fn tags_payload(response: &HttpResponse, tags: &[String], yield_text: bool) -> Result<Value> {
    Ok(serde_json::to_value(TagsArgs {
        response,
        tags,
        yield_text,
    })?)
}

/// Worker runtime with both parser operations registered
pub fn worker_runtime(registry: ParserRegistry) -> WorkerRuntime {
    let registry = Arc::new(registry);
    let tags_registry = Arc::clone(&registry);

    WorkerRuntime::new()
        .handler(OP_PARSE_DOCUMENT, move |input| {
            let input: ParseInput = serde_json::from_value(input)?;
            let data = registry.parse(&input.response)?;
            Ok(serde_json::to_value(data)?)
        })
        .handler(OP_TAGS_BY_FILTER, move |input| {
            let input: TagsInput = serde_json::from_value(input)?;
            let tags = tags_registry.tags_by_filter(&input.response, &input.tags, input.yield_text)?;
            Ok(serde_json::to_value(tags)?)
        })
}

/// Entry point for a worker process using the standard parsers
pub fn run_standard_worker() -> Result<()> {
    init_worker();
    worker_runtime(ParserRegistry::standard()).serve()
}
