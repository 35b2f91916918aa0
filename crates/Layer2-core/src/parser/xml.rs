//! XML parser (quick-xml)
//!
//! Strict: mismatched end tags and broken attributes are a `ParseFailure`.

use super::extract::{find_emails, is_followable, regex_references, resolve, URL_ATTRS};
use super::DocumentParser;
use crate::document::{DocumentData, Tag};
use crate::response::HttpResponse;
use docpool_foundation::{Error, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::{BTreeMap, BTreeSet};
use url::Url;

pub struct XmlParser;

impl XmlParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for XmlParser {
    fn default() -> Self {
        Self::new()
    }
}

fn failure(response: &HttpResponse, e: impl std::fmt::Display) -> Error {
    Error::parse_failure(format!("malformed XML in \"{}\": {}", response.url, e))
}

/// Local name, lower-cased, namespace prefix dropped
fn local_name(start: &BytesStart<'_>) -> String {
    let name = start.name();
    String::from_utf8_lossy(name.local_name().as_ref()).to_ascii_lowercase()
}

fn attributes(start: &BytesStart<'_>) -> std::result::Result<BTreeMap<String, String>, String> {
    let mut map = BTreeMap::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr.unescape_value().map_err(|e| e.to_string())?.to_string();
        map.insert(key, value);
    }
    Ok(map)
}

/// Stream every event of the document through `on_event`
fn walk<F>(response: &HttpResponse, mut on_event: F) -> Result<()>
where
    F: FnMut(XmlItem) -> Result<()>,
{
    let mut reader = Reader::from_reader(response.body.as_slice());
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(start)) => {
                let attrs = attributes(&start).map_err(|e| failure(response, e))?;
                on_event(XmlItem::Open {
                    name: local_name(&start),
                    attributes: attrs,
                    empty: false,
                })?;
            }
            Ok(Event::Empty(start)) => {
                let attrs = attributes(&start).map_err(|e| failure(response, e))?;
                on_event(XmlItem::Open {
                    name: local_name(&start),
                    attributes: attrs,
                    empty: true,
                })?;
            }
            Ok(Event::End(_)) => on_event(XmlItem::Close)?,
            Ok(Event::Text(text)) => {
                let text = text.unescape().map_err(|e| failure(response, e))?;
                on_event(XmlItem::Text(text.into_owned()))?;
            }
            Ok(Event::CData(cdata)) => {
                on_event(XmlItem::Text(String::from_utf8_lossy(&cdata).into_owned()))?;
            }
            Ok(Event::Comment(comment)) => {
                on_event(XmlItem::Comment(String::from_utf8_lossy(&comment).into_owned()))?;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(failure(
                    response,
                    format!("{} at byte {}", e, reader.error_position()),
                ))
            }
        }
        buf.clear();
    }
    Ok(())
}

enum XmlItem {
    Open {
        name: String,
        attributes: BTreeMap<String, String>,
        empty: bool,
    },
    Close,
    Text(String),
    Comment(String),
}

impl DocumentParser for XmlParser {
    fn name(&self) -> &'static str {
        "xml"
    }

    fn can_parse(&self, content_type: &str) -> bool {
        content_type.ends_with("/xml") || content_type.ends_with("+xml")
    }

    fn parse(&self, response: &HttpResponse) -> Result<DocumentData> {
        let base = Url::parse(&response.url).ok();
        let mut data = DocumentData::new(self.name(), response.url.clone());
        let mut references = BTreeSet::new();
        let mut in_title = false;

        walk(response, |item| {
            match item {
                XmlItem::Open {
                    name,
                    attributes,
                    empty,
                } => {
                    in_title = name == "title" && !empty && data.title.is_none();
                    for (key, value) in &attributes {
                        let key = key
                            .rsplit(':')
                            .next()
                            .unwrap_or(key.as_str())
                            .to_ascii_lowercase();
                        if URL_ATTRS.contains(&key.as_str()) && is_followable(value) {
                            if let Some(url) = resolve(base.as_ref(), value) {
                                references.insert(url);
                            }
                        }
                    }
                }
                XmlItem::Text(text) if in_title => {
                    data.title = Some(text);
                    in_title = false;
                }
                XmlItem::Comment(comment) => data.comments.push(comment),
                XmlItem::Close | XmlItem::Text(_) => {}
            }
            Ok(())
        })?;

        let text = response.body_text();
        data.re_references = regex_references(&text, base.as_ref())
            .into_iter()
            .filter(|u| !references.contains(u))
            .collect();
        data.references = references.into_iter().collect();
        data.emails = find_emails(&text).into_iter().collect();
        Ok(data)
    }

    fn tags_by_filter(
        &self,
        response: &HttpResponse,
        names: &[String],
        yield_text: bool,
    ) -> Result<Option<Vec<Tag>>> {
        let wanted: Vec<String> = names.iter().map(|n| n.to_ascii_lowercase()).collect();
        let mut tags: Vec<Tag> = Vec::new();
        // text 를 기다리는 태그 (index)
        let mut pending: Option<usize> = None;

        walk(response, |item| {
            match item {
                XmlItem::Open {
                    name,
                    attributes,
                    empty,
                } => {
                    pending = None;
                    if wanted.is_empty() || wanted.contains(&name) {
                        tags.push(Tag {
                            name,
                            attributes,
                            text: None,
                        });
                        if yield_text && !empty {
                            pending = Some(tags.len() - 1);
                        }
                    }
                }
                XmlItem::Text(text) => {
                    if let Some(index) = pending.take() {
                        tags[index].text = Some(text);
                    }
                }
                XmlItem::Close | XmlItem::Comment(_) => pending = None,
            }
            Ok(())
        })?;

        Ok(Some(tags))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0"?>
<!-- generated -->
<rss xmlns:atom="http://www.w3.org/2005/Atom">
  <channel>
    <title>docpool news</title>
    <atom:link href="/feed.xml" rel="self"/>
    <item><link>http://example.org/post/1</link></item>
    <contact>admin@example.org</contact>
  </channel>
</rss>"#;

    fn response(body: &str) -> HttpResponse {
        HttpResponse::from_text("http://example.org/rss", body).with_content_type("application/rss+xml")
    }

    #[test]
    fn test_parse_feed() {
        let data = XmlParser::new().parse(&response(FEED)).unwrap();
        assert_eq!(data.title.as_deref(), Some("docpool news"));
        assert_eq!(data.comments, vec![" generated ".to_string()]);
        assert_eq!(data.references, vec!["http://example.org/feed.xml".to_string()]);
        assert!(data.re_references.contains(&"http://example.org/post/1".to_string()));
        assert_eq!(data.emails, vec!["admin@example.org".to_string()]);
    }

    #[test]
    fn test_mismatched_tags_fail() {
        let err = XmlParser::new()
            .parse(&response("<a><b></a>"))
            .unwrap_err();
        assert!(matches!(err, Error::ParseFailure(_)));
        assert!(!err.is_no_parser());
    }

    #[test]
    fn test_tags_by_filter() {
        let tags = XmlParser::new()
            .tags_by_filter(&response(FEED), &["link".to_string(), "title".to_string()], true)
            .unwrap()
            .unwrap();

        let names: Vec<&str> = tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["title", "link", "link"]);
        assert_eq!(tags[0].text.as_deref(), Some("docpool news"));
        assert_eq!(tags[1].attr("href"), Some("/feed.xml"));
        assert!(tags[1].text.is_none());
        assert_eq!(tags[2].text.as_deref(), Some("http://example.org/post/1"));
    }
}
