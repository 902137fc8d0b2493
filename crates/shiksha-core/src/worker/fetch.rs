//! Request/response values and the `Fetcher` seam.
//!
//! Everything that goes over the network goes through a `Fetcher`. The real
//! implementation is `HttpFetcher`; the cache layer wraps any fetcher and is
//! itself a fetcher, so callers never know whether a response came from the
//! network or a bucket.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::{Client, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

/// Body of the structured offline API response.
pub const OFFLINE_MESSAGE: &str = "This feature requires an internet connection";

const OFFLINE_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Offline - Shiksha Leap</title>
</head>
<body>
<h1>You're Offline</h1>
<p>Please check your internet connection.
Your progress is saved locally and will sync when you reconnect.</p>
<button onclick="location.reload()">Try Again</button>
</body>
</html>"#;

#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Head,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
        }
    }

    fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Delete => reqwest::Method::DELETE,
            Self::Head => reqwest::Method::HEAD,
        }
    }
}

/// An outgoing request. Header names are stored lowercase.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: BTreeMap::new(),
            body: Vec::new(),
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post_json<B: Serialize>(url: Url, body: &B) -> Result<Self, FetchError> {
        let body = serde_json::to_vec(body).map_err(|e| FetchError::InvalidRequest(e.to_string()))?;
        let mut request =
            Self::new(Method::Post, url).with_header("content-type", "application/json");
        request.body = body;
        Ok(request)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// A page load rather than a subresource or API call.
    pub fn is_navigation(&self) -> bool {
        self.header("accept").is_some_and(|accept| accept.contains("text/html"))
    }

    /// Cache key: the URL without its fragment.
    pub fn cache_key(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        url.to_string()
    }
}

/// How a response may be used, mirroring fetch response types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    #[default]
    Basic,
    Cors,
    /// Body and status are not readable; never cached.
    Opaque,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub status: u16,
    #[serde(default)]
    pub status_text: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(with = "body_base64")]
    pub body: Vec<u8>,
    #[serde(default)]
    pub kind: ResponseKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            status_text: reqwest::StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or_default()
                .to_string(),
            headers: BTreeMap::new(),
            body: body.into(),
            kind: ResponseKind::Basic,
            url: None,
        }
    }

    pub fn json_body<T: Serialize>(status: u16, value: &T) -> Self {
        let body = serde_json::to_vec(value).unwrap_or_default();
        Self::new(status, body).with_header("content-type", "application/json")
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }

    /// 503 JSON returned for API calls that could not reach the network.
    pub fn offline_api() -> Self {
        Self::json_body(
            503,
            &serde_json::json!({
                "error": "Offline",
                "message": OFFLINE_MESSAGE,
                "offline": true,
            }),
        )
    }

    /// Generated page for navigations with nothing cached.
    pub fn offline_page() -> Self {
        Self::new(200, OFFLINE_PAGE).with_header("content-type", "text/html")
    }

    pub fn offline_plain() -> Self {
        Self::new(503, "Offline").with_header("content-type", "text/plain")
    }

    /// True for the payload produced by `offline_api`.
    pub fn is_offline_payload(&self) -> bool {
        self.status == 503
            && self
                .json::<serde_json::Value>()
                .map(|v| v["offline"] == true)
                .unwrap_or(false)
    }
}

mod body_base64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: Request) -> Result<Response, FetchError>;
}

#[async_trait]
impl<F: Fetcher + ?Sized> Fetcher for Arc<F> {
    async fn fetch(&self, request: Request) -> Result<Response, FetchError> {
        (**self).fetch(request).await
    }
}

/// Network fetcher backed by reqwest.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    jar: Arc<Jar>,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        Self::with_jar(timeout, Arc::new(Jar::default()))
    }

    /// Share a cookie jar so a restored session stays authorized.
    pub fn with_jar(timeout: Duration, jar: Arc<Jar>) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .cookie_provider(Arc::clone(&jar))
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(Self { client, jar, timeout })
    }

    pub fn jar(&self) -> &Arc<Jar> {
        &self.jar
    }

    fn map_error(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: Request) -> Result<Response, FetchError> {
        debug!(method = request.method.as_str(), url = %request.url, "Network fetch");

        let mut builder = self.client.request(request.method.to_reqwest(), request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }

        let response = builder.send().await.map_err(|e| self.map_error(e))?;

        let status = response.status();
        let kind = if response.url().origin() == request.url.origin() {
            ResponseKind::Basic
        } else {
            ResponseKind::Cors
        };
        let url = Some(response.url().to_string());
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value.to_str().ok().map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(|e| self.map_error(e))?.to_vec();

        Ok(Response {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
            kind,
            url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(path: &str) -> Url {
        Url::parse("https://shiksha.test")
            .and_then(|base| base.join(path))
            .expect("valid url")
    }

    #[test]
    fn test_navigation_detection() {
        let page = Request::get(url("/")).with_header("Accept", "text/html,application/xhtml+xml");
        assert!(page.is_navigation());
        assert!(!Request::get(url("/static/js/main.js")).is_navigation());
    }

    #[test]
    fn test_cache_key_drops_fragment() {
        let request = Request::get(url("/games/grade_6/maths_game1.json#level2"));
        assert_eq!(request.cache_key(), "https://shiksha.test/games/grade_6/maths_game1.json");
    }

    #[test]
    fn test_offline_api_payload() {
        let response = Response::offline_api();
        assert_eq!(response.status, 503);
        let body: serde_json::Value = response.json().expect("json body");
        assert_eq!(body["error"], "Offline");
        assert_eq!(body["message"], OFFLINE_MESSAGE);
        assert_eq!(body["offline"], true);
        assert!(response.is_offline_payload());
        assert!(!Response::offline_plain().is_offline_payload());
    }

    #[test]
    fn test_response_body_persists_as_base64() {
        let response = Response::new(200, vec![0u8, 159, 146, 150]);
        let json = serde_json::to_value(&response).expect("serialize");
        assert_eq!(json["body"], "AJ+Slg==");
        let back: Response = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, response);
    }

    #[test]
    fn test_post_json_sets_content_type() {
        let request =
            Request::post_json(url("/api/send-code"), &serde_json::json!({"contact": "x"}))
                .expect("request");
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.header("Content-Type"), Some("application/json"));
        assert_eq!(request.body, br#"{"contact":"x"}"#.to_vec());
    }
}
