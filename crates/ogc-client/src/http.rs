//! Resilient HTTP access to OGC and ArcGIS services.
//!
//! Key features:
//! - Pluggable transport behind [`HttpTransport`]
//! - Exponential backoff retry on transient statuses and connection errors
//! - Optional response caching keyed by the full request signature
//! - Service error messages surfaced from rejected responses

use async_trait::async_trait;
use bytes::Bytes;
use metrics::counter;
use reqwest::Client;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use ogc_common::{OgcError, OgcResult};
use ogc_protocol::extract_error_message;

use crate::cache::ResponseCache;
use crate::config::ClientConfig;

/// HTTP method of a service request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to a service. GET params go in the query string, POST params
/// are form encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRequest {
    pub method: Method,
    pub url: String,
    pub params: Vec<(String, String)>,
}

impl ServiceRequest {
    pub fn get(url: impl Into<String>, params: Vec<(String, String)>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            params,
        }
    }

    pub fn post(url: impl Into<String>, params: Vec<(String, String)>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            params,
        }
    }

    /// Cache key for this request; parameter order does not matter.
    ///
    /// Pairs are JSON encoded so separators inside keys or values cannot make
    /// two different requests share a key.
    pub fn cache_key(&self) -> String {
        let mut params: Vec<&(String, String)> = self.params.iter().collect();
        params.sort();
        let encoded = Value::Array(
            params
                .into_iter()
                .map(|(k, v)| Value::Array(vec![Value::from(k.as_str()), Value::from(v.as_str())]))
                .collect(),
        );
        format!("{} {} {}", self.method, Value::from(self.url.as_str()), encoded)
    }
}

/// Status and body of a service response.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceResponse {
    pub status: u16,
    pub body: Bytes,
}

impl ServiceResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> OgcResult<Value> {
        serde_json::from_slice(&self.body).map_err(OgcError::from)
    }
}

/// Sends a single request and returns whatever the server answered.
///
/// Implementations return `OgcError::Transport` for connection-level
/// failures and a [`ServiceResponse`] for every HTTP answer, including error
/// statuses.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &ServiceRequest) -> OgcResult<ServiceResponse>;
}

/// Transport backed by `reqwest`.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(config: &ClientConfig) -> OgcResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(4)
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()
            .map_err(|e| OgcError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &ServiceRequest) -> OgcResult<ServiceResponse> {
        let builder = match request.method {
            Method::Get => self.client.get(&request.url).query(&request.params),
            Method::Post => self.client.post(&request.url).form(&request.params),
        };

        let response = builder
            .send()
            .await
            .map_err(|e| OgcError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| OgcError::Transport(e.to_string()))?;

        Ok(ServiceResponse { status, body })
    }
}

/// HTTP client with retry, backoff and caching.
///
/// Lifecycle is open (`open` or `with_transport`), use (`request`), close (`close`).
pub struct RetryClient<T: HttpTransport = ReqwestTransport> {
    transport: T,
    cache: Option<ResponseCache>,
    config: ClientConfig,
}

impl RetryClient<ReqwestTransport> {
    /// Create a client using `reqwest` as transport.
    pub fn open(config: ClientConfig) -> OgcResult<Self> {
        let transport = ReqwestTransport::new(&config)?;
        Self::with_transport(transport, config)
    }
}

impl<T: HttpTransport> RetryClient<T> {
    /// Create a client over an arbitrary transport.
    pub fn with_transport(transport: T, config: ClientConfig) -> OgcResult<Self> {
        config.validate()?;
        let cache = config
            .cache_enabled
            .then(|| ResponseCache::new(config.cache_capacity, config.cache_expiry()));

        Ok(Self {
            transport,
            cache,
            config,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn get(&self, url: &str, params: Vec<(String, String)>) -> OgcResult<ServiceResponse> {
        self.request(&ServiceRequest::get(url, params)).await
    }

    /// Send `request`, retrying transient failures.
    ///
    /// Non-2xx answers that are not retried, or that are still failing once
    /// retries run out, become `ServiceRejected` with the service's own
    /// message when one can be extracted.
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    pub async fn request(&self, request: &ServiceRequest) -> OgcResult<ServiceResponse> {
        let key = request.cache_key();
        if let Some(cache) = &self.cache {
            if let Some(body) = cache.get(&key).await {
                counter!("ogc_http_cache_hits_total").increment(1);
                debug!("Serving response from cache");
                return Ok(ServiceResponse::new(200, body));
            }
        }

        let mut retry_count = 0;
        let mut delay = self.config.initial_backoff();

        loop {
            counter!("ogc_http_requests_total").increment(1);
            let result = self.transport.send(request).await;

            let transient = match &result {
                Ok(response) => self.config.retry_statuses.contains(&response.status),
                Err(OgcError::Transport(_)) => true,
                Err(_) => false,
            };

            if transient && retry_count < self.config.max_retries {
                retry_count += 1;
                counter!("ogc_http_retries_total").increment(1);
                warn!(
                    status = ?result.as_ref().ok().map(|r| r.status),
                    error = ?result.as_ref().err(),
                    retry = retry_count,
                    max_retries = self.config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Request failed, retrying"
                );

                tokio::time::sleep(delay).await;

                // Exponential backoff
                delay = std::cmp::min(delay * 2, self.config.max_backoff());
                continue;
            }

            let response = result?;
            if !response.is_success() {
                let mut message = extract_error_message(&response.text());
                if message.is_empty() {
                    message = "service returned an empty error response".to_string();
                }
                return Err(OgcError::service_rejected(Some(response.status), message));
            }

            if let Some(cache) = &self.cache {
                cache.put(key, response.body.clone()).await;
            }
            return Ok(response);
        }
    }

    /// Forget a cached response, e.g. one that carried an error in a 2xx body.
    pub async fn evict(&self, request: &ServiceRequest) {
        if let Some(cache) = &self.cache {
            cache.remove(&request.cache_key()).await;
        }
    }

    /// Release cached responses.
    pub async fn close(&self) {
        if let Some(cache) = &self.cache {
            let entries = cache.len().await;
            cache.clear().await;
            info!(entries, "Closed client and dropped cached responses");
        }
    }
}
