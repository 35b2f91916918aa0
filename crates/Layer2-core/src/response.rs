//! HTTP response as seen by the parsers
//!
//! Body bytes are kept as-is; they cross the process boundary base64 encoded.

use serde::{Deserialize, Serialize};

/// Raw HTTP response handed to the cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub url: String,

    #[serde(with = "body_base64")]
    pub body: Vec<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charset: Option<String>,
}

impl HttpResponse {
    pub fn new(url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            body: body.into(),
            content_type: None,
            charset: None,
        }
    }

    /// Text body, stored as its UTF-8 bytes
    pub fn from_text(url: impl Into<String>, body: &str) -> Self {
        Self::new(url, body.as_bytes().to_vec()).with_charset("utf-8")
    }

    /// Content type, with parameters split off into `charset`
    ///
    /// `"text/html; charset=ISO-8859-1"` becomes `text/html` + `iso-8859-1`.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        let raw = content_type.into();
        let mut parts = raw.split(';');
        let mime = parts.next().unwrap_or_default().trim().to_ascii_lowercase();

        for param in parts {
            if let Some((name, value)) = param.split_once('=') {
                if name.trim().eq_ignore_ascii_case("charset") {
                    self.charset = Some(value.trim().trim_matches('"').to_ascii_lowercase());
                }
            }
        }

        self.content_type = if mime.is_empty() { None } else { Some(mime) };
        self
    }

    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.iter().all(|b| b.is_ascii_whitespace())
    }

    /// Body decoded as UTF-8, invalid sequences replaced
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

mod body_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
