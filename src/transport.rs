//! HTTP transport abstraction for upstream requests

use crate::constants::USER_AGENT;
use async_trait::async_trait;
use reqwest::Client;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Logical identity plus wire details of one upstream GET
///
/// Only `endpoint` and `params` form the identity; `base_url` and `headers`
/// (which may carry API keys) are excluded from [`UpstreamRequest::cache_key`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamRequest {
    pub base_url: String,
    pub endpoint: String,
    pub params: BTreeMap<String, String>,
    pub headers: Vec<(String, String)>,
}

impl UpstreamRequest {
    /// Creates a request with no parameters or headers
    pub fn new(base_url: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            endpoint: endpoint.into(),
            params: BTreeMap::new(),
            headers: Vec::new(),
        }
    }

    /// Adds a query parameter
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Adds a header when a value is present
    pub fn header_opt(mut self, name: &str, value: Option<&str>) -> Self {
        if let Some(value) = value {
            self.headers.push((name.to_string(), value.to_string()));
        }
        self
    }

    /// Full URL without the query string
    pub fn url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.endpoint)
    }

    /// Query string with parameters in sorted key order
    pub fn query_string(&self) -> String {
        self.params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Cache identity: endpoint plus sorted parameters
    pub fn cache_key(&self) -> String {
        if self.params.is_empty() {
            self.endpoint.clone()
        } else {
            format!("{}?{}", self.endpoint, self.query_string())
        }
    }
}

/// Raw upstream answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: String,
}

impl UpstreamResponse {
    /// Creates a response from a status code and body
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failure before any HTTP status was received
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("failed to read response body: {0}")]
    Body(String),
}

/// Performs a single upstream GET without retries
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends `request` and returns the raw status and body
    async fn get(
        &self,
        request: &UpstreamRequest,
        timeout: Duration,
    ) -> Result<UpstreamResponse, TransportError>;

    /// Short name used in logs
    fn transport_name(&self) -> &'static str;
}

/// `reqwest`-backed transport
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Creates a transport with the default client settings
    pub fn new() -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        Ok(Self { client })
    }

    /// Wraps an existing client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(
        &self,
        request: &UpstreamRequest,
        timeout: Duration,
    ) -> Result<UpstreamResponse, TransportError> {
        let mut builder = self
            .client
            .get(request.url())
            .query(&request.params)
            .header("Accept", "application/json")
            .timeout(timeout);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Connect(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Body(e.to_string())
            }
        })?;

        Ok(UpstreamResponse { status, body })
    }

    fn transport_name(&self) -> &'static str {
        "reqwest"
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_sorts_params_and_skips_headers() {
        let a = UpstreamRequest::new("https://one.example", "/simple/price")
            .param("vs_currencies", "usd")
            .param("ids", "bitcoin")
            .header_opt("x-cg-demo-api-key", Some("secret"));
        let b = UpstreamRequest::new("https://two.example", "/simple/price")
            .param("ids", "bitcoin")
            .param("vs_currencies", "usd");

        assert_eq!(a.cache_key(), "/simple/price?ids=bitcoin&vs_currencies=usd");
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_url_joins_base_and_endpoint() {
        let request = UpstreamRequest::new("https://api.example/v3/", "/global");
        assert_eq!(request.url(), "https://api.example/v3/global");
        assert_eq!(request.cache_key(), "/global");
    }
}
