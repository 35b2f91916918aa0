//! Plain text parser (regex only)

use super::extract::{find_emails, regex_references};
use super::DocumentParser;
use crate::document::DocumentData;
use crate::response::HttpResponse;
use docpool_foundation::Result;
use url::Url;

pub struct TextParser;

impl TextParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TextParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentParser for TextParser {
    fn name(&self) -> &'static str {
        "text"
    }

    fn can_parse(&self, content_type: &str) -> bool {
        content_type.starts_with("text/")
    }

    fn parse(&self, response: &HttpResponse) -> Result<DocumentData> {
        let text = response.body_text();
        let base = Url::parse(&response.url).ok();

        let mut data = DocumentData::new(self.name(), response.url.clone());
        data.re_references = regex_references(&text, base.as_ref()).into_iter().collect();
        data.emails = find_emails(&text).into_iter().collect();
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParserRegistry;

    #[test]
    fn test_text_references_and_emails() {
        let resp = HttpResponse::from_text(
            "http://example.org/robots.txt",
            "Disallow: /admin/login.php\nSitemap: http://example.org/sitemap.xml\n# webmaster@example.org",
        )
        .with_content_type("text/plain");

        let data = TextParser::new().parse(&resp).unwrap();
        assert!(data.references.is_empty());
        assert!(data
            .re_references
            .contains(&"http://example.org/admin/login.php".to_string()));
        assert!(data
            .re_references
            .contains(&"http://example.org/sitemap.xml".to_string()));
        assert_eq!(data.emails, vec!["webmaster@example.org".to_string()]);
    }

    #[test]
    fn test_text_has_no_tags() {
        let resp = HttpResponse::from_text("http://example.org/a.css", "body { color: red }")
            .with_content_type("text/css");
        let tags = ParserRegistry::standard()
            .tags_by_filter(&resp, &["a".to_string()], false)
            .unwrap();
        assert!(tags.is_empty());
    }
}
