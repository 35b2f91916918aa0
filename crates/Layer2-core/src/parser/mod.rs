//! Document parsers
//!
//! 파서는 content type 으로 선택된다. content type 이 없으면 body 앞부분을
//! 보고 추정한다.
//!
//! ```text
//! text/html, application/xhtml+xml  → HtmlParser (scraper)
//! */xml, *+xml                      → XmlParser  (quick-xml)
//! application/pdf                   → PdfParser
//! text/*                            → TextParser
//! image/*                           → "There is no parser for images."
//! ```

pub mod extract;
mod html;
mod pdf;
mod text;
mod xml;

pub use html::HtmlParser;
pub use pdf::PdfParser;
pub use text::TextParser;
pub use xml::XmlParser;

use crate::document::{DocumentData, Tag};
use crate::response::HttpResponse;
use docpool_foundation::{Error, Result};
use std::sync::Arc;
use tracing::debug;

/// Message used when the response is an image
pub const NO_PARSER_FOR_IMAGES: &str = "There is no parser for images.";

/// A concrete parser for one family of content types
pub trait DocumentParser: Send + Sync {
    /// Short name recorded in [`DocumentData::parser`]
    fn name(&self) -> &'static str;

    /// Whether this parser handles the (lower-case, parameter-free) mime type
    fn can_parse(&self, content_type: &str) -> bool;

    /// Extract the document
    fn parse(&self, response: &HttpResponse) -> Result<DocumentData>;

    /// Tags matching `names` (all tags when empty), in document order
    ///
    /// `None` means the parser has no notion of tags.
    fn tags_by_filter(
        &self,
        _response: &HttpResponse,
        _names: &[String],
        _yield_text: bool,
    ) -> Result<Option<Vec<Tag>>> {
        Ok(None)
    }
}

/// Content type family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Html,
    Xml,
    Pdf,
    Text,
    Image,
    Unknown,
}

impl ContentKind {
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.trim().to_ascii_lowercase();
        if mime.starts_with("image/") {
            Self::Image
        } else if mime == "text/html" || mime == "application/xhtml+xml" {
            Self::Html
        } else if mime == "application/pdf" {
            Self::Pdf
        } else if mime.ends_with("/xml") || mime.ends_with("+xml") {
            Self::Xml
        } else if mime.starts_with("text/") {
            Self::Text
        } else {
            Self::Unknown
        }
    }

    /// Guess from the first bytes of the body
    pub fn sniff(body: &[u8]) -> Self {
        const PNG: &[u8] = b"\x89PNG";
        const JPEG: &[u8] = b"\xFF\xD8\xFF";

        if body.starts_with(PNG)
            || body.starts_with(JPEG)
            || body.starts_with(b"GIF87a")
            || body.starts_with(b"GIF89a")
        {
            return Self::Image;
        }

        let head_len = body.len().min(1024);
        let head = String::from_utf8_lossy(&body[..head_len]).to_ascii_lowercase();
        let head = head.trim_start();

        if head.starts_with("%pdf-") {
            Self::Pdf
        } else if head.contains("<html") || head.starts_with("<!doctype html") {
            Self::Html
        } else if head.starts_with("<?xml") {
            Self::Xml
        } else if std::str::from_utf8(body).is_ok() {
            Self::Text
        } else {
            Self::Unknown
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::Html => "text/html",
            Self::Xml => "application/xml",
            Self::Pdf => "application/pdf",
            Self::Text => "text/plain",
            Self::Image => "image/*",
            Self::Unknown => "application/octet-stream",
        }
    }
}

/// 파서 레지스트리
///
/// 등록 순서대로 `can_parse` 를 확인한다.
pub struct ParserRegistry {
    parsers: Vec<Arc<dyn DocumentParser>>,
}

impl ParserRegistry {
    /// 빈 레지스트리 생성
    pub fn new() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    /// HTML, XML, PDF, text
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(HtmlParser::new()));
        registry.register(Arc::new(XmlParser::new()));
        registry.register(Arc::new(PdfParser::new()));
        registry.register(Arc::new(TextParser::new()));
        registry
    }

    pub fn register(&mut self, parser: Arc<dyn DocumentParser>) {
        self.parsers.push(parser);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.parsers.iter().map(|p| p.name()).collect()
    }

    /// Pick the parser for a response
    pub fn select(&self, response: &HttpResponse) -> Result<Arc<dyn DocumentParser>> {
        if response.is_empty() {
            return Err(Error::unsupported(format!(
                "Empty response body for \"{}\", nothing to parse.",
                response.url
            )));
        }

        let kind = match response.content_type.as_deref() {
            Some(mime) => match ContentKind::from_mime(mime) {
                ContentKind::Unknown => ContentKind::sniff(&response.body),
                kind => kind,
            },
            None => ContentKind::sniff(&response.body),
        };

        if kind == ContentKind::Image {
            return Err(Error::unsupported(NO_PARSER_FOR_IMAGES));
        }

        let mime = match response.content_type.as_deref() {
            Some(mime) if ContentKind::from_mime(mime) == kind => mime,
            _ => kind.mime(),
        };

        let parser = self
            .parsers
            .iter()
            .find(|p| p.can_parse(mime))
            .cloned()
            .ok_or_else(|| {
                Error::unsupported(format!(
                    "There is no parser for \"{}\" (content type {})",
                    response.url, mime
                ))
            })?;

        debug!(url = %response.url, parser = parser.name(), mime, "selected parser");
        Ok(parser)
    }

    pub fn parse(&self, response: &HttpResponse) -> Result<DocumentData> {
        self.select(response)?.parse(response)
    }

    /// Filtered tags; parsers without tags and empty bodies yield `[]`
    pub fn tags_by_filter(
        &self,
        response: &HttpResponse,
        names: &[String],
        yield_text: bool,
    ) -> Result<Vec<Tag>> {
        if response.is_empty() {
            return Ok(Vec::new());
        }
        let parser = self.select(response)?;
        Ok(parser
            .tags_by_filter(response, names, yield_text)?
            .unwrap_or_default())
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_classification() {
        assert_eq!(ContentKind::from_mime("text/html"), ContentKind::Html);
        assert_eq!(ContentKind::from_mime("application/rss+xml"), ContentKind::Xml);
        assert_eq!(ContentKind::from_mime("text/xml"), ContentKind::Xml);
        assert_eq!(ContentKind::from_mime("text/css"), ContentKind::Text);
        assert_eq!(ContentKind::from_mime("image/jpeg"), ContentKind::Image);
        assert_eq!(ContentKind::from_mime("application/zip"), ContentKind::Unknown);
    }

    #[test]
    fn test_sniffing() {
        assert_eq!(ContentKind::sniff(b"%PDF-1.4\n"), ContentKind::Pdf);
        assert_eq!(ContentKind::sniff(b"  <!DOCTYPE html><html>"), ContentKind::Html);
        assert_eq!(ContentKind::sniff(b"<?xml version=\"1.0\"?><a/>"), ContentKind::Xml);
        assert_eq!(ContentKind::sniff(b"GIF89a...."), ContentKind::Image);
        assert_eq!(ContentKind::sniff(b"plain words"), ContentKind::Text);
        assert_eq!(ContentKind::sniff(&[0xff, 0xfe, 0x00, 0x9f]), ContentKind::Unknown);
    }

    #[test]
    fn test_images_have_no_parser() {
        let registry = ParserRegistry::standard();
        let resp = HttpResponse::new("http://example.org/a.png", b"\x89PNG....".to_vec())
            .with_content_type("image/png");

        let err = registry.parse(&resp).unwrap_err();
        assert!(err.is_no_parser());
        assert_eq!(err.to_string(), NO_PARSER_FOR_IMAGES);
    }

    #[test]
    fn test_empty_body_is_unsupported() {
        let registry = ParserRegistry::standard();
        let resp = HttpResponse::from_text("http://example.org/", "  ").with_content_type("text/html");

        assert!(matches!(registry.parse(&resp), Err(Error::UnsupportedContent(_))));
        assert!(registry.tags_by_filter(&resp, &[], false).unwrap().is_empty());
    }

    #[test]
    fn test_select_by_content_type() {
        let registry = ParserRegistry::standard();
        let cases = [
            ("text/html", "html"),
            ("application/xml", "xml"),
            ("application/pdf", "pdf"),
            ("text/plain", "text"),
        ];
        for (mime, expected) in cases {
            let resp = HttpResponse::from_text("http://example.org/", "x").with_content_type(mime);
            assert_eq!(registry.select(&resp).unwrap().name(), expected);
        }
    }

    #[test]
    fn test_unknown_binary_is_unsupported() {
        let registry = ParserRegistry::standard();
        let resp = HttpResponse::new("http://example.org/x.bin", vec![0xff, 0xfe, 0x00, 0x9f])
            .with_content_type("application/octet-stream");
        assert!(matches!(registry.select(&resp), Err(Error::UnsupportedContent(_))));
    }
}
