//! Request and response model for intercepted fetches
//!
//! Responses own their body as a plain byte buffer. A network body can only be
//! handed out once, so anything that needs a second reader (the cache store)
//! must take an explicit copy with [`Response::duplicate`] first.

mod network;

pub use network::{FetchError, Fetcher, HttpFetcher};

use reqwest::Method;
use serde::{Deserialize, Serialize};
use url::Url;

/// An outgoing request seen by the interceptor
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method
    pub method: Method,
    /// Absolute request URL
    pub url: Url,
    /// Request headers, in the order they were supplied
    pub headers: Vec<(String, String)>,
}

impl Request {
    /// Creates a GET request for the given URL
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: Vec::new(),
        }
    }

    /// Creates a request with an explicit method
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
        }
    }

    /// Adds a header to the request
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Returns the cache identity of this request
    pub fn key(&self) -> RequestKey {
        RequestKey::new(self.method.as_str(), &self.url)
    }
}

/// Identity of a request inside a cache generation: method plus URL
///
/// Fragments are not part of the identity, so `/index.html#top` and
/// `/index.html` share one entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    pub method: String,
    pub url: String,
}

impl RequestKey {
    pub fn new(method: &str, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method: method.to_ascii_uppercase(),
            url: url.to_string(),
        }
    }

    /// Key for a plain GET of the given URL
    pub fn get(url: &Url) -> Self {
        Self::new("GET", url)
    }

    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }
}

impl std::fmt::Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// How a response relates to the origin that requested it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Same-origin response, fully readable
    Basic,
    /// Cross-origin response the server explicitly shared with us
    Cors,
    /// Cross-origin response that was not shared
    Opaque,
}

impl ResponseType {
    /// Classifies a response fetched from `response_url` on behalf of `origin`
    ///
    /// `allow_origin` is the value of the `access-control-allow-origin` header, if any.
    pub fn classify(origin: &Url, response_url: &Url, allow_origin: Option<&str>) -> Self {
        if origin.origin() == response_url.origin() {
            return ResponseType::Basic;
        }

        let ours = origin.origin().ascii_serialization();
        match allow_origin.map(str::trim) {
            Some("*") => ResponseType::Cors,
            Some(value) if value == ours => ResponseType::Cors,
            _ => ResponseType::Opaque,
        }
    }
}

/// A response with its body fully buffered
#[derive(Debug, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: Vec<u8>,
    /// Origin classification
    pub response_type: ResponseType,
    /// Final URL the response came from
    pub url: Option<Url>,
}

impl Response {
    /// Builds a same-origin response with the given status and body
    pub fn basic(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
            response_type: ResponseType::Basic,
            url: None,
        }
    }

    pub fn with_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    /// Takes an independent copy of this response, body included
    ///
    /// The original stays with the caller; the copy is what gets stored.
    pub fn duplicate(&self) -> Response {
        Response {
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
            response_type: self.response_type,
            url: self.url.clone(),
        }
    }

    /// Whether the status is in the 2xx range
    pub fn is_ok(&self) -> bool {
        (200..=299).contains(&self.status)
    }

    /// Only plain 200 same-origin responses are written to the cache
    pub fn is_cacheable(&self) -> bool {
        self.status == 200 && self.response_type == ResponseType::Basic
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Consumes the response and returns its body
    pub fn into_body(self) -> Vec<u8> {
        self.body
    }
}
