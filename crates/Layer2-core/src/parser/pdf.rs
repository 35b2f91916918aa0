//! PDF parser
//!
//! No stream decompression: link annotations (`/URI (...)`) and the
//! document title are usually stored uncompressed, which is enough here.

use super::extract::{find_emails, parse_mailto, resolve};
use super::DocumentParser;
use crate::document::DocumentData;
use crate::response::HttpResponse;
use docpool_foundation::{Error, Result};
use lazy_static::lazy_static;
use regex::bytes::Regex;
use std::collections::BTreeSet;
use url::Url;

lazy_static! {
    static ref URI_RE: Regex = Regex::new(r"/URI\s*\(([^)]*)\)").expect("valid uri regex");
    static ref TITLE_RE: Regex = Regex::new(r"/Title\s*\(([^)]*)\)").expect("valid title regex");
}

pub struct PdfParser;

impl PdfParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PdfParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentParser for PdfParser {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn can_parse(&self, content_type: &str) -> bool {
        content_type == "application/pdf"
    }

    fn parse(&self, response: &HttpResponse) -> Result<DocumentData> {
        let body = response.body.as_slice();
        let start = body
            .windows(5)
            .take(1024)
            .position(|w| w == b"%PDF-")
            .ok_or_else(|| {
                Error::parse_failure(format!("\"{}\" is not a PDF document", response.url))
            })?;
        let body = &body[start..];

        let base = Url::parse(&response.url).ok();
        let mut data = DocumentData::new(self.name(), response.url.clone());
        let mut references = BTreeSet::new();
        let mut emails = BTreeSet::new();

        for caps in URI_RE.captures_iter(body) {
            let Some(raw) = caps.get(1) else { continue };
            let value = String::from_utf8_lossy(raw.as_bytes());
            if let Some(email) = parse_mailto(&value) {
                emails.insert(email);
            } else if let Some(url) = resolve(base.as_ref(), &value) {
                references.insert(url);
            }
        }

        data.title = TITLE_RE
            .captures(body)
            .and_then(|c| c.get(1))
            .map(|m| String::from_utf8_lossy(m.as_bytes()).trim().to_string())
            .filter(|t| !t.is_empty());

        emails.extend(find_emails(&String::from_utf8_lossy(body)));

        data.references = references.into_iter().collect();
        data.emails = emails.into_iter().collect();
        Ok(data)
    }
}
