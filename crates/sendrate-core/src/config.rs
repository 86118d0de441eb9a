use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::SendRateError;

pub const DEFAULT_SEND_TIMEOUT_MS: u64 = 60_000;

/// Write limits in effect for one request after scope resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteLimits {
    pub send_timeout: Duration,
    /// Bytes per second. 0 disables the slow-connection check.
    pub minimum_send_rate: u64,
}

impl Default for WriteLimits {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_millis(DEFAULT_SEND_TIMEOUT_MS),
            minimum_send_rate: 0,
        }
    }
}

/// The values a single configuration scope may set. `None` inherits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ScopeLimits {
    pub send_timeout_ms: Option<u64>,
    pub minimum_send_rate: Option<u64>,
}

impl ScopeLimits {
    /// Most specific scope wins: fields set on `self` shadow the parent's.
    pub fn merge(self, parent: ScopeLimits) -> ScopeLimits {
        ScopeLimits {
            send_timeout_ms: self.send_timeout_ms.or(parent.send_timeout_ms),
            minimum_send_rate: self.minimum_send_rate.or(parent.minimum_send_rate),
        }
    }

    /// Fills whatever is still unset from the built-in defaults.
    pub fn resolve(self) -> WriteLimits {
        let defaults = WriteLimits::default();
        WriteLimits {
            send_timeout: self
                .send_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.send_timeout),
            minimum_send_rate: self.minimum_send_rate.unwrap_or(defaults.minimum_send_rate),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct LocationConfig {
    pub prefix: String,
    #[serde(flatten)]
    pub limits: ScopeLimits,
    /// Proxy requests under this prefix to `host:port` instead of serving locally.
    pub upstream: Option<String>,
    /// Buffer upstream responses before writing downstream. Not inherited.
    pub proxy_buffering: Option<bool>,
}

impl LocationConfig {
    pub fn proxy_buffering(&self) -> bool {
        self.proxy_buffering.unwrap_or(true)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(flatten)]
    pub limits: ScopeLimits,
    /// Size of the body the demo server streams per request.
    pub body_size: usize,
    #[serde(rename = "location")]
    pub locations: Vec<LocationConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            limits: ScopeLimits::default(),
            body_size: 1024 * 1024,
            locations: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, SendRateError> {
        let config: ServerConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SendRateError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), SendRateError> {
        if self.port == 0 {
            return Err(SendRateError::Config("port must be non-zero".into()));
        }
        if self.limits.send_timeout_ms == Some(0) {
            return Err(SendRateError::Config("send_timeout_ms must be non-zero".into()));
        }
        for location in &self.locations {
            if !location.prefix.starts_with('/') {
                return Err(SendRateError::Config(format!(
                    "location prefix {:?} must start with '/'",
                    location.prefix
                )));
            }
            if location.limits.send_timeout_ms == Some(0) {
                return Err(SendRateError::Config(format!(
                    "location {:?}: send_timeout_ms must be non-zero",
                    location.prefix
                )));
            }
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The most specific location matching `path`, if any.
    pub fn location_for(&self, path: &str) -> Option<&LocationConfig> {
        self.locations
            .iter()
            .filter(|loc| path.starts_with(loc.prefix.as_str()))
            .max_by_key(|loc| loc.prefix.len())
    }

    /// Resolves the limits for a request path.
    ///
    /// Every location whose prefix matches is layered over the server scope,
    /// shortest prefix first, so `/a/b` inherits what it leaves unset from `/a`.
    pub fn limits_for(&self, path: &str) -> WriteLimits {
        let mut matching: Vec<&LocationConfig> = self
            .locations
            .iter()
            .filter(|loc| path.starts_with(loc.prefix.as_str()))
            .collect();
        matching.sort_by_key(|loc| loc.prefix.len());

        matching
            .into_iter()
            .fold(self.limits, |parent, loc| loc.limits.merge(parent))
            .resolve()
    }
}
