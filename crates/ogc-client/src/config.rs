//! Configuration for the HTTP client and batched retrieval.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use ogc_common::{OgcError, OgcResult};

/// Client configuration.
///
/// Every field has a default, so a YAML file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Maximum transport-level retries per request.
    pub max_retries: u32,

    /// First retry delay in milliseconds (doubles each retry).
    pub initial_backoff_ms: u64,

    /// Upper bound for the retry delay in seconds.
    pub max_backoff_secs: u64,

    /// HTTP statuses that are retried.
    pub retry_statuses: Vec<u16>,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Verify TLS certificates.
    pub verify_ssl: bool,

    /// Cache successful responses in memory.
    pub cache_enabled: bool,

    /// Cache entry lifetime in seconds; `None` never expires.
    pub cache_expiry_secs: Option<u64>,

    /// Maximum number of cached responses.
    pub cache_capacity: usize,

    /// Batches fetched concurrently. Some services truncate responses under
    /// concurrent load, so the default is sequential.
    pub max_workers: usize,

    /// Skip the retry pass for missing identifiers.
    pub disable_retry: bool,

    /// Retry passes for missing identifiers after the first fetch.
    pub retry_passes: u32,

    /// Directory for unresolved identifier files.
    pub failure_dir: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 300,
            max_backoff_secs: 30,
            retry_statuses: vec![500, 502, 504],
            request_timeout_secs: 60,
            verify_ssl: true,
            cache_enabled: true,
            cache_expiry_secs: None,
            cache_capacity: 512,
            max_workers: 1,
            disable_retry: false,
            retry_passes: 1,
            failure_dir: PathBuf::from("cache"),
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `OGC_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Load from a YAML file, then apply environment overrides.
    pub fn load(path: &Path) -> OgcResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            OgcError::Io(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let config: ClientConfig = serde_yaml::from_str(&content).map_err(|e| {
            OgcError::Decode(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })?;

        debug!(path = %path.display(), "Loaded client config");
        Ok(config.with_env_overrides())
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("OGC_MAX_RETRIES") {
            if let Ok(n) = val.parse() {
                self.max_retries = n;
            }
        }

        if let Ok(val) = std::env::var("OGC_VERIFY_SSL") {
            self.verify_ssl = parse_flag(&val);
        }

        if let Ok(val) = std::env::var("OGC_CACHE_DISABLE") {
            self.cache_enabled = !parse_flag(&val);
        }

        // negative values mean "never expire"
        if let Ok(val) = std::env::var("OGC_CACHE_EXPIRE") {
            if let Ok(secs) = val.parse::<i64>() {
                self.cache_expiry_secs = u64::try_from(secs).ok();
            }
        }

        if let Ok(val) = std::env::var("OGC_MAX_WORKERS") {
            if let Ok(n) = val.parse() {
                self.max_workers = n;
            }
        }

        if let Ok(val) = std::env::var("OGC_DISABLE_RETRY") {
            self.disable_retry = parse_flag(&val);
        }

        if let Ok(val) = std::env::var("OGC_FAILURE_DIR") {
            self.failure_dir = PathBuf::from(val);
        }

        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> OgcResult<()> {
        if self.max_workers == 0 {
            return Err(OgcError::input_value(
                "max_workers",
                ["a positive number of workers"],
            ));
        }

        if self.cache_enabled && self.cache_capacity == 0 {
            return Err(OgcError::input_value(
                "cache_capacity",
                ["a positive number of entries"],
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(OgcError::input_value(
                "request_timeout_secs",
                ["a positive number of seconds"],
            ));
        }

        if let Some(status) = self.retry_statuses.iter().find(|s| !(100..600).contains(*s)) {
            return Err(OgcError::input_value(
                "retry_statuses",
                [format!("HTTP status codes between 100 and 599, got {}", status)],
            ));
        }

        Ok(())
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cache_expiry(&self) -> Option<Duration> {
        self.cache_expiry_secs.map(Duration::from_secs)
    }
}

fn parse_flag(val: &str) -> bool {
    matches!(val.to_lowercase().as_str(), "true" | "1" | "yes")
}
