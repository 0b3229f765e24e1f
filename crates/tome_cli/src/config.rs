use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tome_engine::{
    default_endpoints, default_user_agents, CoordinatorConfig, EndpointConfig, FetchSettings,
    RetryPolicy, DEFAULT_PAGE_TEMPLATE, ID_PLACEHOLDER,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path:?}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("no endpoints configured")]
    NoEndpoints,
    #[error("endpoint {id} is configured twice")]
    DuplicateEndpoint { id: String },
    #[error("template of {id} has no {{id}} placeholder: {template}")]
    MissingPlaceholder { id: String, template: String },
    #[error("max_concurrency must be at least 1")]
    InvalidConcurrency,
    #[error("max_retries_per_endpoint must be at least 1")]
    InvalidRetries,
    #[error("base_delay_ms must be at most 60000, got {0}")]
    InvalidDelay(u64),
}

/// Longest backoff step accepted from configuration.
pub const MAX_BASE_DELAY_MS: u64 = 60_000;

/// Everything the `tome` binary can be told through its RON config file.
/// Absent fields keep their defaults; durations are in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomeConfig {
    pub output_dir: PathBuf,
    pub index_page_template: String,
    pub index_retries: u32,
    pub endpoints: Vec<EndpointConfig>,

    pub max_concurrency: usize,
    pub grace_period_ms: u64,
    pub pass_delay_ms: u64,

    pub max_retries_per_endpoint: u32,
    pub base_delay_ms: u64,
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
    pub failure_ceiling: u32,

    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub redirect_limit: usize,
    pub max_bytes: u64,
    pub user_agents: Vec<String>,
    pub cookie: Option<String>,
}

impl Default for TomeConfig {
    fn default() -> Self {
        let fetch = FetchSettings::default();
        let retry = RetryPolicy::default();
        let coordinator = CoordinatorConfig::default();
        Self {
            output_dir: PathBuf::from("."),
            index_page_template: DEFAULT_PAGE_TEMPLATE.to_string(),
            index_retries: 3,
            endpoints: default_endpoints(),
            max_concurrency: coordinator.max_concurrency,
            grace_period_ms: millis(coordinator.grace_period),
            pass_delay_ms: millis(coordinator.pass_delay),
            max_retries_per_endpoint: retry.max_retries_per_endpoint,
            base_delay_ms: millis(retry.base_delay),
            jitter_min_ms: millis(retry.jitter_min),
            jitter_max_ms: millis(retry.jitter_max),
            failure_ceiling: retry.failure_ceiling,
            connect_timeout_ms: millis(fetch.connect_timeout),
            request_timeout_ms: millis(fetch.request_timeout),
            redirect_limit: fetch.redirect_limit,
            max_bytes: fetch.max_bytes,
            user_agents: default_user_agents(),
            cookie: None,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

impl TomeConfig {
    /// Reads `path` when given, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn parse(content: &str) -> Result<Self, String> {
        ron::from_str(content).map_err(|err| err.to_string())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoints.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }
        let mut seen = HashSet::new();
        for endpoint in &self.endpoints {
            if !seen.insert(endpoint.id.as_str()) {
                return Err(ConfigError::DuplicateEndpoint {
                    id: endpoint.id.clone(),
                });
            }
            if !endpoint.url_template.contains(ID_PLACEHOLDER) {
                return Err(ConfigError::MissingPlaceholder {
                    id: endpoint.id.clone(),
                    template: endpoint.url_template.clone(),
                });
            }
        }
        if !self.index_page_template.contains(ID_PLACEHOLDER) {
            return Err(ConfigError::MissingPlaceholder {
                id: "index".to_string(),
                template: self.index_page_template.clone(),
            });
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }
        if self.max_retries_per_endpoint == 0 {
            return Err(ConfigError::InvalidRetries);
        }
        if self.base_delay_ms > MAX_BASE_DELAY_MS {
            return Err(ConfigError::InvalidDelay(self.base_delay_ms));
        }
        Ok(())
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            redirect_limit: self.redirect_limit,
            max_bytes: self.max_bytes,
            user_agents: self.user_agents.clone(),
            cookie: self.cookie.clone(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries_per_endpoint: self.max_retries_per_endpoint,
            base_delay: Duration::from_millis(self.base_delay_ms),
            jitter_min: Duration::from_millis(self.jitter_min_ms),
            jitter_max: Duration::from_millis(self.jitter_max_ms),
            failure_ceiling: self.failure_ceiling,
        }
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            max_concurrency: self.max_concurrency,
            grace_period: Duration::from_millis(self.grace_period_ms),
            pass_delay: Duration::from_millis(self.pass_delay_ms),
        }
    }
}
