//! Network access for cache misses
//!
//! The interceptor only talks to the network through the [`Fetcher`] trait so
//! tests and alternative hosts can script the responses.

use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN};
use reqwest::Client;
use thiserror::Error;
use tracing::debug;
use url::Url;

use super::{Request, Response, ResponseType};

/// Errors that can occur when going to the network
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP request failed (connection refused, DNS, TLS, ...)
    #[error("HTTP request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// A request header could not be sent as given
    #[error("Invalid request header: {0}")]
    InvalidHeader(String),
}

/// Something that can perform a real network fetch
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}

/// Fetcher backed by a reqwest client, acting on behalf of one origin
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    origin: Url,
}

impl HttpFetcher {
    /// Create a new HttpFetcher for the given origin with default settings
    pub fn new(origin: Url) -> Self {
        Self {
            client: Client::new(),
            origin,
        }
    }

    /// Create a new HttpFetcher with a custom HTTP client
    pub fn with_client(client: Client, origin: Url) -> Self {
        Self { client, origin }
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());

        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| FetchError::InvalidHeader(name.clone()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| FetchError::InvalidHeader(name.to_string()))?;
            builder = builder.header(name, value);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let final_url = response.url().clone();

        let allow_origin = response
            .headers()
            .get(ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let response_type = ResponseType::classify(&self.origin, &final_url, allow_origin.as_deref());

        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        let body = response.bytes().await?.to_vec();

        debug!(
            url = %final_url,
            status,
            ?response_type,
            bytes = body.len(),
            "network response"
        );

        Ok(Response {
            status,
            headers,
            body,
            response_type,
            url: Some(final_url),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_header_name_is_rejected_before_sending() {
        let origin = Url::parse("http://127.0.0.1:9/").unwrap();
        let fetcher = HttpFetcher::new(origin.clone());
        let request = Request::get(origin.join("/data.json").unwrap()).with_header("bad header", "x");

        let err = fetcher.fetch(&request).await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidHeader(_)));
    }

    #[test]
    fn test_fetcher_keeps_origin() {
        let origin = Url::parse("http://localhost:8080/").unwrap();
        let fetcher = HttpFetcher::new(origin.clone());
        assert_eq!(fetcher.origin(), &origin);
    }
}
