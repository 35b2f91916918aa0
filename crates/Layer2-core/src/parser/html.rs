//! HTML parser (scraper / html5ever)
//!
//! html5ever recovers from any markup, so this parser never fails on
//! malformed input; garbage simply yields an almost empty document.

use super::extract::{
    find_emails, is_followable, meta_refresh_target, parse_mailto, regex_references, resolve,
    TAGS_WITH_URLS, URL_ATTRS,
};
use super::DocumentParser;
use crate::document::{DocumentData, Form, FormField, MetaTag, Tag};
use crate::response::HttpResponse;
use docpool_foundation::Result;
use scraper::{ElementRef, Html, Node, Selector};
use std::collections::{BTreeMap, BTreeSet};
use url::Url;

pub struct HtmlParser;

impl HtmlParser {
    pub fn new() -> Self {
        Self
    }

    /// Document URL, overridden by the first `<base href>`
    fn base_url(document: &Html, url: &str) -> Option<Url> {
        let page = Url::parse(url).ok();
        let base_href = selector("base[href]").and_then(|sel| {
            document
                .select(&sel)
                .next()
                .and_then(|el| el.value().attr("href").map(str::to_string))
        });

        match (page, base_href) {
            (Some(page), Some(href)) => page.join(&href).ok().or(Some(page)),
            (None, Some(href)) => Url::parse(&href).ok(),
            (page, None) => page,
        }
    }
}

impl Default for HtmlParser {
    fn default() -> Self {
        Self::new()
    }
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn element_text(el: &ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

impl DocumentParser for HtmlParser {
    fn name(&self) -> &'static str {
        "html"
    }

    fn can_parse(&self, content_type: &str) -> bool {
        matches!(content_type, "text/html" | "application/xhtml+xml")
    }

    fn parse(&self, response: &HttpResponse) -> Result<DocumentData> {
        let text = response.body_text();
        let document = Html::parse_document(&text);
        let base = Self::base_url(&document, &response.url);

        let mut data = DocumentData::new(self.name(), response.url.clone());
        let mut references = BTreeSet::new();
        let mut emails = BTreeSet::new();

        // title
        if let Some(sel) = selector("title") {
            data.title = document
                .select(&sel)
                .next()
                .map(|el| element_text(&el))
                .filter(|t| !t.is_empty());
        }

        // comments
        for node in document.tree.nodes() {
            if let Node::Comment(comment) = node.value() {
                data.comments.push(comment.comment.to_string());
            }
        }

        // references + mailto
        for el in document.root_element().descendants().filter_map(ElementRef::wrap) {
            let tag = el.value().name();
            if !TAGS_WITH_URLS.contains(&tag) {
                continue;
            }
            for (attr, value) in el.value().attrs() {
                if !URL_ATTRS.contains(&attr) {
                    continue;
                }
                if let Some(email) = parse_mailto(value) {
                    emails.insert(email);
                    continue;
                }
                if is_followable(value) {
                    if let Some(url) = resolve(base.as_ref(), value) {
                        references.insert(url);
                    }
                }
            }
        }

        // meta
        if let Some(sel) = selector("meta") {
            for el in document.select(&sel) {
                let attributes: BTreeMap<String, String> = el
                    .value()
                    .attrs()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect();

                let is_refresh = attributes
                    .get("http-equiv")
                    .map(|v| v.eq_ignore_ascii_case("refresh"))
                    .unwrap_or(false);
                if is_refresh {
                    if let Some(content) = attributes.get("content") {
                        data.meta_redirects.push(content.clone());
                        if let Some(url) = meta_refresh_target(content)
                            .and_then(|target| resolve(base.as_ref(), &target))
                        {
                            references.insert(url);
                        }
                    }
                }

                data.meta_tags.push(MetaTag { attributes });
            }
        }

        // forms
        if let (Some(form_sel), Some(field_sel)) =
            (selector("form"), selector("input, select, textarea, button"))
        {
            for form in document.select(&form_sel) {
                let action = form
                    .value()
                    .attr("action")
                    .and_then(|a| resolve(base.as_ref(), a))
                    .or_else(|| base.as_ref().map(|b| b.to_string()))
                    .unwrap_or_else(|| response.url.clone());
                let method = form
                    .value()
                    .attr("method")
                    .map(|m| m.trim().to_ascii_uppercase())
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "GET".to_string());

                let fields = form
                    .select(&field_sel)
                    .filter_map(|field| {
                        let name = field.value().attr("name")?.to_string();
                        let element = field.value().name();
                        let field_type = match element {
                            "input" => field
                                .value()
                                .attr("type")
                                .unwrap_or("text")
                                .to_ascii_lowercase(),
                            other => other.to_string(),
                        };
                        let value = match element {
                            "textarea" => Some(element_text(&field)),
                            _ => field.value().attr("value").map(str::to_string),
                        };
                        Some(FormField {
                            name,
                            field_type,
                            value,
                        })
                    })
                    .collect();

                data.forms.push(Form {
                    action,
                    method,
                    fields,
                });
            }
        }

        emails.extend(find_emails(&text));

        let re_references: BTreeSet<String> = regex_references(&text, base.as_ref())
            .into_iter()
            .filter(|u| !references.contains(u))
            .collect();

        data.references = references.into_iter().collect();
        data.re_references = re_references.into_iter().collect();
        data.emails = emails.into_iter().collect();
        Ok(data)
    }

    fn tags_by_filter(
        &self,
        response: &HttpResponse,
        names: &[String],
        yield_text: bool,
    ) -> Result<Option<Vec<Tag>>> {
        let document = Html::parse_document(&response.body_text());
        let wanted: Vec<String> = names.iter().map(|n| n.to_ascii_lowercase()).collect();

        let tags = document
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(|el| wanted.is_empty() || wanted.iter().any(|n| n == el.value().name()))
            .map(|el| {
                let attributes = el
                    .value()
                    .attrs()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect();
                // 첫 자식이 텍스트 노드일 때만
                let text = if yield_text {
                    el.first_child()
                        .and_then(|child| child.value().as_text().map(|t| t.text.to_string()))
                } else {
                    None
                };
                Tag {
                    name: el.value().name().to_string(),
                    attributes,
                    text,
                }
            })
            .collect();

        Ok(Some(tags))
    }
}
