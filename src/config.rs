//! Configuration management for Turnstile.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, TurnstileError};
use crate::ratelimit::{LimitConfig, SweeperConfig};

/// Prefix for environment overrides, e.g. `TURNSTILE__RATE_LIMITING__MAX_REQUESTS`.
const ENV_PREFIX: &str = "TURNSTILE";

/// Main configuration for the Turnstile service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,

    /// Origins allowed by CORS; `*` allows any origin
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

/// Rate limiting configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Refill window length in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Bucket capacity and requests allowed per window
    #[serde(default = "default_max_requests")]
    pub max_requests: u64,

    /// Idle-bucket sweep interval in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Whole windows a bucket must sit idle before it may be evicted
    #[serde(default = "default_idle_windows")]
    pub idle_windows: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            max_requests: default_max_requests(),
            sweep_interval_secs: default_sweep_interval(),
            idle_windows: default_idle_windows(),
        }
    }
}

fn default_window_ms() -> u64 {
    60_000
}

fn default_max_requests() -> u64 {
    100
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_idle_windows() -> u64 {
    2
}

impl RateLimitingConfig {
    /// The limit applied to every client key.
    pub fn limit_config(&self) -> LimitConfig {
        LimitConfig::new(self.window_ms, self.max_requests)
    }

    /// Settings for the idle-bucket sweeper.
    pub fn sweeper_config(&self) -> SweeperConfig {
        SweeperConfig {
            interval: Duration::from_secs(self.sweep_interval_secs),
            idle_ms: self.window_ms.saturating_mul(self.idle_windows),
        }
    }

    fn validate(&self) -> Result<()> {
        self.limit_config().validate()?;
        if self.sweep_interval_secs == 0 {
            return Err(TurnstileError::Config(
                "sweep_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.idle_windows == 0 {
            return Err(TurnstileError::Config(
                "idle_windows must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl TurnstileConfig {
    /// Load configuration from an optional YAML file layered under
    /// `TURNSTILE__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }

        let config: TurnstileConfig = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("server.allowed_origins")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TurnstileConfig = serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that would otherwise fail later at construction time.
    pub fn validate(&self) -> Result<()> {
        if self.server.allowed_origins.is_empty() {
            return Err(TurnstileError::Config(
                "allowed_origins must not be empty".to_string(),
            ));
        }
        self.rate_limiting.validate()
    }
}
