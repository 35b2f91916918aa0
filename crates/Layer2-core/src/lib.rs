//! docpool-core: document model and parsers
//!
//! Layer2 - 파싱 레이어
//!
//! # 주요 모듈
//!
//! - `response`: 파서 입력 (`HttpResponse`)
//! - `document`: 파싱 결과 (`DocumentData`, `ParsedDocument`, `Tag`)
//! - `parser`: content type 별 파서와 `ParserRegistry`
//!
//! 파서는 신뢰할 수 없는 입력을 다루므로 보통 worker 프로세스 안에서만
//! 실행된다. 이 crate 자체는 프로세스를 알지 못한다.
//!
//! # 사용 예시
//!
//! ```ignore
//! use docpool_core::{HttpResponse, ParserRegistry};
//!
//! let registry = ParserRegistry::standard();
//! let resp = HttpResponse::from_text("http://example.org/", "<a href='/x'>x</a>")
//!     .with_content_type("text/html");
//! let data = registry.parse(&resp)?;
//! ```

pub mod document;
pub mod parser;
pub mod response;

// Re-exports: Document
pub use document::{DocumentData, Form, FormField, MetaTag, ParsedDocument, Tag};

// Re-exports: Parser
pub use parser::{
    ContentKind, DocumentParser, HtmlParser, ParserRegistry, PdfParser, TextParser, XmlParser,
    NO_PARSER_FOR_IMAGES,
};

// Re-exports: Response
pub use response::HttpResponse;
