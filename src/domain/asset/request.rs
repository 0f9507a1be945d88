use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};

/// A request the asset cache may intercept.
#[derive(Debug, Clone)]
pub struct AssetRequest {
    pub method: Method,
    pub url: Url,
    /// Raw `Accept` header, used to tell documents from static assets
    pub accept: Option<String>,
    /// Ask intermediaries for a fresh copy (`Cache-Control: no-cache`)
    pub bypass_cache: bool,
}

impl AssetRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            accept: None,
            bypass_cache: false,
        }
    }

    /// A navigation request for an HTML document.
    pub fn document(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            accept: Some("text/html,application/xhtml+xml;q=0.9,*/*;q=0.8".to_string()),
            bypass_cache: false,
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn bypassing_cache(mut self) -> Self {
        self.bypass_cache = true;
        self
    }

    /// Content negotiation says the caller wants HTML.
    pub fn is_document(&self) -> bool {
        self.accept
            .as_deref()
            .map(|accept| accept.to_ascii_lowercase().contains("text/html"))
            .unwrap_or(false)
    }

    pub fn request_key(&self) -> String {
        request_key(&self.url)
    }

    pub fn match_key(&self) -> String {
        match_key(&self.url)
    }
}

/// Exact cache key: the full URL without fragment.
pub fn request_key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.to_string()
}

/// Lookup key that ignores query-string variance.
pub fn match_key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.to_string()
}

/// Where a routed response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Network,
    Cache,
    OfflineFallback,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseSource::Network => "network",
            ResponseSource::Cache => "cache",
            ResponseSource::OfflineFallback => "offline_fallback",
        }
    }
}

/// A network response, as fetched or as stored in a generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetResponse {
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub source: ResponseSource,
}

impl AssetResponse {
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            status,
            headers: Vec::new(),
            body: body.into(),
            source: ResponseSource::Network,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_source(mut self, source: ResponseSource) -> Self {
        self.source = source;
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_document_detection() {
        assert!(AssetRequest::document(url("https://e.com/")).is_document());
        assert!(!AssetRequest::get(url("https://e.com/app.js")).is_document());

        let mut req = AssetRequest::get(url("https://e.com/"));
        req.accept = Some("TEXT/HTML".to_string());
        assert!(req.is_document());
    }

    #[test]
    fn test_match_key_ignores_query() {
        let a = AssetRequest::get(url("https://e.com/assets/app.js?v=1"));
        let b = AssetRequest::get(url("https://e.com/assets/app.js?v=2#top"));
        assert_eq!(a.match_key(), b.match_key());
        assert_ne!(a.request_key(), b.request_key());
        assert_eq!(a.match_key(), "https://e.com/assets/app.js");
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = AssetResponse::new("https://e.com/", 200, "ok")
            .with_header("Content-Type", "text/html");
        assert_eq!(response.header("content-type"), Some("text/html"));
        assert!(response.is_success());
    }
}
