//! HTTP transport adapter: the leaf every gateway sends through.
//!
//! [`HttpTransport::send_raw`] performs the wire call and reports whatever
//! status came back; [`HttpTransport::execute`] is what gateways call and
//! turns any non-2xx status into `Failed(Network, ...)`. Test doubles only
//! implement `send_raw`, so status classification is shared by every
//! transport.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use crate::error::{ProviderFailure, ProviderResult};

/// Request method. Upstreams here only need these two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// HTTP GET.
    Get,
    /// HTTP POST with a JSON body.
    Post,
}

/// An outbound request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Method.
    pub method: Method,
    /// Absolute URL without query string.
    pub url: String,
    /// Query-string pairs.
    pub query: Vec<(String, String)>,
    /// Extra headers.
    pub headers: Vec<(String, String)>,
    /// JSON body (POST only).
    pub body: Option<serde_json::Value>,
    /// Hard deadline for the whole exchange, body included.
    pub timeout: Duration,
}

impl HttpRequest {
    /// A GET request.
    #[must_use]
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            timeout,
        }
    }

    /// A POST request carrying a JSON body.
    #[must_use]
    pub fn post_json(url: impl Into<String>, body: serde_json::Value, timeout: Duration) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: Some(body),
            timeout,
        }
    }

    /// Append a query-string pair.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Append a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add an `Authorization: Bearer` header.
    #[must_use]
    pub fn with_bearer(self, token: &str) -> Self {
        self.with_header("Authorization", format!("Bearer {token}"))
    }

    /// Look up a query value (first match).
    #[must_use]
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A response as seen by gateways.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Body text.
    pub body: String,
    /// `Retry-After` header, when the upstream sent one.
    pub retry_after: Option<String>,
}

impl HttpResponse {
    /// A response with no `Retry-After` header.
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            retry_after: None,
        }
    }

    /// Whether the status is 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse the body as JSON.
    ///
    /// # Errors
    /// Returns `MalformedResponse` when the body is not JSON.
    pub fn json(&self) -> ProviderResult<serde_json::Value> {
        serde_json::from_str(&self.body).map_err(|e| {
            ProviderFailure::malformed(format!(
                "invalid JSON: {e}; body starts with '{}'",
                preview(&self.body)
            ))
        })
    }
}

/// Map a non-2xx response onto the failure taxonomy.
///
/// 429 keeps its `Retry-After` hint in the detail so callers can honour it.
///
/// # Errors
/// Returns `Failed(Network, ...)` for every non-2xx status.
pub fn check_status(response: HttpResponse) -> ProviderResult<HttpResponse> {
    if response.is_success() {
        return Ok(response);
    }
    let detail = match (response.status, &response.retry_after) {
        (429, Some(after)) => format!("HTTP 429: rate limited (retry after {after}s)"),
        (429, None) => "HTTP 429: rate limited".to_string(),
        (status, _) => format!("HTTP {status}: {}", preview(&response.body)),
    };
    Err(ProviderFailure::network(detail))
}

fn preview(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() <= MAX {
        body.to_string()
    } else {
        let head: String = body.chars().take(MAX).collect();
        format!("{head}…")
    }
}

/// Outbound HTTP client abstraction.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Perform the exchange and report any status.
    ///
    /// Only transport-level problems (DNS, refused connection, timeout)
    /// are errors here.
    async fn send_raw(&self, request: HttpRequest) -> ProviderResult<HttpResponse>;

    /// Perform the exchange; any non-2xx status is a `Network` failure.
    async fn execute(&self, request: HttpRequest) -> ProviderResult<HttpResponse> {
        let url = request.url.clone();
        let response = self.send_raw(request).await?;
        check_status(response).inspect_err(|failure| {
            warn!(url = %url, detail = %failure.detail, "Upstream returned error status");
        })
    }
}

/// [`HttpTransport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: Client,
}

impl ReqwestTransport {
    /// Create a transport with a fresh connection pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }

    /// Wrap an existing client (shared pool, custom TLS, proxies...).
    #[must_use]
    pub fn with_client(http: Client) -> Self {
        Self { http }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send_raw(&self, request: HttpRequest) -> ProviderResult<HttpResponse> {
        let start = Instant::now();
        let mut builder = match request.method {
            Method::Get => self.http.get(&request.url),
            Method::Post => self.http.post(&request.url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e, request.timeout))?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(|e| classify_transport_error(&e, request.timeout))?;

        debug!(
            url = %request.url,
            status,
            bytes = body.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "HTTP exchange complete"
        );

        Ok(HttpResponse {
            status,
            body,
            retry_after,
        })
    }
}

fn classify_transport_error(err: &reqwest::Error, timeout: Duration) -> ProviderFailure {
    if err.is_timeout() {
        ProviderFailure::network(format!("timeout after {}ms", timeout.as_millis()))
    } else if err.is_connect() {
        ProviderFailure::network(format!("connection failed: {err}"))
    } else {
        ProviderFailure::network(err.to_string())
    }
}
