//! Typed client for the DigitalOcean REST API
//!
//! The transport sends JSON requests with a bearer token, enforces the
//! configured request rate, retries 429/502/503/504 and network failures
//! with exponential backoff, and turns non-2xx responses into
//! [`ProviderError`]s classified by status. Endpoint groups live in the
//! submodules as `impl Client` blocks next to their wire types.

pub mod actions;
pub mod byoip;
pub mod domains;
pub mod droplets;
pub mod keys;
pub mod partner_attachments;
pub mod reserved_ips;
pub mod snapshots;
pub mod spaces_keys;
pub mod vpc_peerings;

use std::time::Duration;

use reef_core::pagination::{self, ListOptions, Page};
use reef_core::provider::{ErrorKind, ProviderError, ProviderResult};
use reqwest::Method;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::log_sanitizer::{sanitize_body, sanitize_json};

const PROVIDER_NAME: &str = "digitalocean";
const USER_AGENT: &str = concat!("reef-provider-digitalocean/", env!("CARGO_PKG_VERSION"));

/// Transport failure below the HTTP status level
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Error body returned by the API
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub timeout: Duration,
    pub retry_max: u32,
    /// 0 disables the limiter
    pub requests_per_second: f64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            retry_max: 4,
            requests_per_second: 0.0,
        }
    }
}

pub struct Client {
    http: reqwest::Client,
    base_url: String,
    token: String,
    retry_max: u32,
    min_interval: Option<Duration>,
    next_slot: Mutex<Option<Instant>>,
}

impl Client {
    pub fn new(base_url: &str, token: &str, options: ClientOptions) -> ProviderResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(options.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| {
                ProviderError::internal("failed to build HTTP client").with_cause(TransportError::from(e))
            })?;
        let min_interval = (options.requests_per_second > 0.0)
            .then(|| Duration::from_secs_f64(1.0 / options.requests_per_second));
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            retry_max: options.retry_max,
            min_interval,
            next_slot: Mutex::new(None),
        })
    }

    /// Wait for the next request slot
    async fn throttle(&self) {
        let Some(interval) = self.min_interval else {
            return;
        };
        let wait_until = {
            let mut slot = self.next_slot.lock().await;
            let now = Instant::now();
            let at = slot.map_or(now, |s| s.max(now));
            *slot = Some(at + interval);
            at
        };
        tokio::time::sleep_until(wait_until).await;
    }

    async fn execute_once(
        &self,
        method: &Method,
        url: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> ProviderResult<(u16, String)> {
        self.throttle().await;
        log::debug!("[{PROVIDER_NAME}] {method} {url}");
        if let Some(body) = body {
            log::debug!("[{PROVIDER_NAME}] Request Body: {}", sanitize_json(body));
        }

        let mut request = self
            .http
            .request(method.clone(), url)
            .bearer_auth(&self.token)
            .header("Accept", "application/json");
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            let kind = if e.is_timeout() { ErrorKind::Timeout } else { ErrorKind::Transient };
            ProviderError::new(kind, format!("{method} {url}: {e}")).with_cause(TransportError::from(e))
        })?;

        let status = response.status().as_u16();
        log::debug!("[{PROVIDER_NAME}] Response Status: {status}");
        let text = response.text().await.map_err(|e| {
            ProviderError::new(ErrorKind::Transient, format!("{method} {url}: failed to read response body"))
                .with_cause(TransportError::from(e))
        })?;
        log::debug!("[{PROVIDER_NAME}] Response Body: {}", sanitize_body(&text));

        if status >= 400 {
            let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
            let message = body.message.unwrap_or_else(|| text.trim().to_string());
            let detail = match body.id {
                Some(id) => format!("{method} {url}: {status} ({id}) {message}"),
                None => format!("{method} {url}: {status} {message}"),
            };
            return Err(ProviderError::from_status(status, detail));
        }
        Ok((status, text))
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> ProviderResult<String> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 0;
        loop {
            match self.execute_once(&method, &url, query, body).await {
                Ok((_, text)) => return Ok(text),
                Err(e) if attempt < self.retry_max && is_retryable(&e) => {
                    let delay = backoff_delay(attempt);
                    log::warn!(
                        "[{}] Request failed (attempt {}/{}), retrying in {:.1}s: {}",
                        PROVIDER_NAME,
                        attempt + 1,
                        self.retry_max,
                        delay.as_secs_f32(),
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<serde_json::Value>,
    ) -> ProviderResult<T> {
        let text = self.execute(method, path, query, body.as_ref()).await?;
        let text = if text.trim().is_empty() { "null" } else { text.as_str() };
        serde_json::from_str(text).map_err(|e| {
            log::error!("[{PROVIDER_NAME}] JSON parse failed: {e}");
            ProviderError::internal(format!("unexpected response from {path}")).with_cause(TransportError::from(e))
        })
    }

    fn encode<B: Serialize>(body: &B) -> ProviderResult<serde_json::Value> {
        serde_json::to_value(body).map_err(|e| {
            ProviderError::internal("failed to encode request body").with_cause(TransportError::from(e))
        })
    }

    /// GET and decode the object under `field`
    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str, field: &str) -> ProviderResult<T> {
        let body: serde_json::Value = self.request(Method::GET, path, &[], None).await?;
        take_field(body, field, path)
    }

    pub(crate) async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
        field: &str,
    ) -> ProviderResult<T> {
        let body: serde_json::Value = self.request(Method::POST, path, &[], Some(Self::encode(body)?)).await?;
        take_field(body, field, path)
    }

    pub(crate) async fn put<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
        field: &str,
    ) -> ProviderResult<T> {
        let body: serde_json::Value = self.request(Method::PUT, path, &[], Some(Self::encode(body)?)).await?;
        take_field(body, field, path)
    }

    pub(crate) async fn patch<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
        field: &str,
    ) -> ProviderResult<T> {
        let body: serde_json::Value = self.request(Method::PATCH, path, &[], Some(Self::encode(body)?)).await?;
        take_field(body, field, path)
    }

    /// POST whose response is the object itself rather than an envelope
    pub(crate) async fn post_bare<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> ProviderResult<T> {
        self.request(Method::POST, path, &[], Some(Self::encode(body)?)).await
    }

    /// POST whose response body is ignored
    pub(crate) async fn post_no_content<B: Serialize>(&self, path: &str, body: &B) -> ProviderResult<()> {
        self.execute(Method::POST, path, &[], Some(&Self::encode(body)?)).await?;
        Ok(())
    }

    pub(crate) async fn delete(&self, path: &str) -> ProviderResult<()> {
        self.execute(Method::DELETE, path, &[], None).await?;
        Ok(())
    }

    pub(crate) async fn delete_with_body<B: Serialize>(&self, path: &str, body: &B) -> ProviderResult<()> {
        self.execute(Method::DELETE, path, &[], Some(&Self::encode(body)?)).await?;
        Ok(())
    }

    /// One page of a list endpoint; items are under `field`
    pub(crate) async fn list<T: DeserializeOwned>(
        &self,
        path: &str,
        field: &str,
        opts: ListOptions,
    ) -> ProviderResult<Page<T>> {
        let mut body: serde_json::Value = self.request(Method::GET, path, &opts.query(), None).await?;
        let links = match body.get_mut("links").map(serde_json::Value::take) {
            Some(links) if !links.is_null() => Some(decode(links, path)?),
            _ => None,
        };
        let items = match body.get_mut(field).map(serde_json::Value::take) {
            Some(items) if !items.is_null() => decode(items, path)?,
            _ => Vec::new(),
        };
        Ok(Page { items, links })
    }

    /// Every item of a list endpoint
    pub(crate) async fn list_all<T: DeserializeOwned>(
        &self,
        path: &str,
        field: &str,
        kind: &str,
    ) -> ProviderResult<Vec<T>> {
        pagination::collect_all(kind, |opts| self.list(path, field, opts)).await
    }
}

fn decode<T: DeserializeOwned>(value: serde_json::Value, path: &str) -> ProviderResult<T> {
    serde_json::from_value(value).map_err(|e| {
        ProviderError::internal(format!("unexpected response from {path}")).with_cause(TransportError::from(e))
    })
}

fn take_field<T: DeserializeOwned>(mut body: serde_json::Value, field: &str, path: &str) -> ProviderResult<T> {
    match body.get_mut(field).map(serde_json::Value::take) {
        Some(value) => decode(value, path),
        None => Err(ProviderError::internal(format!(
            "response from {path} has no '{field}' field"
        ))),
    }
}

/// Network errors, 429 and gateway errors are retried by the transport
fn is_retryable(error: &ProviderError) -> bool {
    match error.status {
        Some(status) => matches!(status, 429 | 502..=504),
        None => matches!(error.kind, ErrorKind::Transient | ErrorKind::Timeout),
    }
}

/// 100ms, 200ms, 400ms, ... capped at 10 seconds
fn backoff_delay(attempt: u32) -> Duration {
    let capped_attempt = attempt.min(20);
    let delay_ms = 100_u64.saturating_mul(1_u64 << capped_attempt);
    Duration::from_millis(delay_ms.min(10_000))
}
