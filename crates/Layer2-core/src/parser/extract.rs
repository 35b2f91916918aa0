//! Shared extraction helpers: URL resolution, regex references, e-mails

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeSet;
use url::Url;

lazy_static! {
    static ref URL_RE: Regex =
        Regex::new(r#"(?:https?)://[\w:@\-./]*?[^ \n\r\t"'<>]*"#).expect("valid url regex");
    static ref RELATIVE_URL_RE: Regex = Regex::new(
        r"(?:[/]{1,2}[\w\-~.%]+)+\.\w{2,4}(?:\?[\w\-~.%]*=[\w\-~.%]*(?:&[\w\-~.%]*=[\w\-~.%]*)*)?"
    )
    .expect("valid relative url regex");
    static ref EMAIL_RE: Regex =
        Regex::new(r"(?i)[a-z0-9_.%-]{1,45}@(?:[a-z0-9.-]{1,45}\.){1,10}[a-z]{2,4}")
            .expect("valid email regex");
    /// "PHP/5.2.4", "Apache/2.2.8" look like relative paths
    static ref VERSION_RE: Regex = Regex::new(r"^.*?/\d\.\d\.\d").expect("valid version regex");
    static ref META_REFRESH_URL_RE: Regex =
        Regex::new(r"(?i).*?URL.*?=(.*)").expect("valid refresh regex");
}

/// Tags whose attributes may carry links
pub const TAGS_WITH_URLS: &[&str] = &[
    "go", "a", "anchor", "img", "link", "script", "iframe", "object", "embed", "area", "frame",
    "applet", "input", "base", "div", "layer", "form", "ilayer", "bgsound", "html", "audio",
    "video", "source",
];

/// Attributes holding links
pub const URL_ATTRS: &[&str] = &["href", "src", "data", "action", "manifest", "link", "uri"];

/// Apache directory index sort links
const APACHE_INDEXING: &[&str] = &[
    "?C=N;O=A", "?C=M;O=A", "?C=S;O=A", "?C=D;O=D", "?C=N;O=D", "?C=D;O=A", "?N=D", "?M=A",
    "?S=A", "?D=A", "?D=D", "?S=D", "?M=D",
];

/// Attribute value worth following as a reference
pub fn is_followable(value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() || value.starts_with('#') || APACHE_INDEXING.contains(&value) {
        return false;
    }
    let lower = value.to_ascii_lowercase();
    !["tel:", "callto:", "mailto:", "javascript:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
}

/// Join `href` onto `base`; only http(s) results are kept
pub fn resolve(base: Option<&Url>, href: &str) -> Option<String> {
    let href = href.trim();
    let joined = match base {
        Some(base) => base.join(href).ok()?,
        None => Url::parse(href).ok()?,
    };
    match joined.scheme() {
        "http" | "https" => Some(joined.to_string()),
        _ => None,
    }
}

/// `"5; URL=http://host/"` → `http://host/`
pub fn meta_refresh_target(content: &str) -> Option<String> {
    META_REFRESH_URL_RE
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().trim_matches(|c| c == '\'' || c == '"').to_string())
        .filter(|s| !s.is_empty())
}

/// `mailto:` address, query part stripped
pub fn parse_mailto(value: &str) -> Option<String> {
    let (scheme, rest) = value.trim().split_once(':')?;
    if !scheme.eq_ignore_ascii_case("mailto") {
        return None;
    }
    let address = rest.split('?').next()?.trim();
    let matched = EMAIL_RE.find(address)?;
    (matched.start() == 0 && matched.end() == address.len()).then(|| address.to_string())
}

/// E-mail addresses appearing anywhere in `text`
pub fn find_emails(text: &str) -> BTreeSet<String> {
    if !text.contains('@') {
        return BTreeSet::new();
    }
    EMAIL_RE
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Absolute and relative URLs found by regular expressions
pub fn regex_references(text: &str, base: Option<&Url>) -> BTreeSet<String> {
    let mut found = BTreeSet::new();

    for m in URL_RE.find_iter(text) {
        if let Some(url) = resolve(None, m.as_str()) {
            found.insert(url);
        }
    }

    for m in RELATIVE_URL_RE.find_iter(text) {
        let candidate = m.as_str();
        if candidate.starts_with("//")
            || candidate.starts_with("://")
            || candidate.starts_with("HTTP/")
            || VERSION_RE.is_match(candidate)
        {
            continue;
        }
        if let Some(url) = resolve(base, candidate) {
            found.insert(url);
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://example.org/dir/index.html").unwrap()
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let base = base();
        assert_eq!(
            resolve(Some(&base), "../a.php?x=1").as_deref(),
            Some("http://example.org/a.php?x=1")
        );
        assert_eq!(
            resolve(Some(&base), "https://other.example/").as_deref(),
            Some("https://other.example/")
        );
        assert!(resolve(Some(&base), "ftp://files.example/x").is_none());
    }

    #[test]
    fn test_followable_filters() {
        assert!(is_followable("/index.php"));
        assert!(!is_followable("#top"));
        assert!(!is_followable("mailto:a@b.com"));
        assert!(!is_followable("javascript:void(0)"));
        assert!(!is_followable("?C=N;O=A"));
    }

    #[test]
    fn test_mailto() {
        assert_eq!(
            parse_mailto("mailto:admin@example.org?subject=hi").as_deref(),
            Some("admin@example.org")
        );
        assert!(parse_mailto("mailto:not-an-address").is_none());
        assert!(parse_mailto("http://example.org/").is_none());
    }

    #[test]
    fn test_find_emails() {
        let emails = find_emails("contact: admin@example.org, or abc@def.co.uk.");
        assert!(emails.contains("admin@example.org"));
        assert!(emails.contains("abc@def.co.uk"));
        assert!(find_emails("no at sign here").is_empty());
    }

    #[test]
    fn test_regex_references() {
        let refs = regex_references(
            "see http://example.org/foo.php and /images/logo.png, server Apache/2.2.8",
            Some(&base()),
        );
        assert!(refs.contains("http://example.org/foo.php"));
        assert!(refs.contains("http://example.org/images/logo.png"));
        assert!(!refs.iter().any(|r| r.contains("Apache")));
    }

    #[test]
    fn test_meta_refresh_target() {
        assert_eq!(
            meta_refresh_target("4;URL=http://www.f00.us/").as_deref(),
            Some("http://www.f00.us/")
        );
        assert_eq!(
            meta_refresh_target("6  ; url = 'next.html'").as_deref(),
            Some("next.html")
        );
        assert!(meta_refresh_target("5").is_none());
    }
}
