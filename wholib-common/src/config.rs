//! Configuration loading for the library client
//!
//! Resolution priority for every field:
//! 1. Environment variable (`WHOLIB_*`, highest priority)
//! 2. TOML config file
//! 3. Compiled default (fallback)
//!
//! A missing config file is never fatal: the client starts with compiled
//! defaults and logs a warning.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// All configuration consumed by the live-update core and the REST client.
///
/// Plain values only; there is no CLI surface.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Base URL of the library REST API (e.g. `http://localhost:8000`)
    pub base_url: String,
    /// SSE endpoint path, joined onto `base_url`
    pub events_path: String,
    /// Address of the socket channel, when one is offered
    pub socket_addr: Option<String>,

    /// Whether the server-push (SSE) channel may be attempted
    pub sse_enabled: bool,
    /// Whether the socket channel may be attempted
    pub socket_enabled: bool,
    /// Whether timed polling is permitted as a last resort
    pub polling_fallback: bool,

    /// Debounce window for the update batcher
    pub debounce: Duration,
    /// First reconnect delay; doubles on every subsequent attempt
    pub reconnect_base_delay: Duration,
    /// Reconnect attempts before giving up (or switching to polling)
    pub max_reconnect_attempts: u32,
    /// Interval between polling fetches in fallback mode
    pub poll_interval: Duration,
    /// Hard deadline on a single mutation request
    pub mutation_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            events_path: "/api/library/events".to_string(),
            socket_addr: None,
            sse_enabled: true,
            socket_enabled: true,
            polling_fallback: true,
            debounce: Duration::from_millis(100),
            reconnect_base_delay: Duration::from_secs(1),
            max_reconnect_attempts: 10,
            poll_interval: Duration::from_secs(10),
            mutation_timeout: Duration::from_secs(30),
        }
    }
}

/// On-disk TOML schema; every field optional so partial files work.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    pub base_url: Option<String>,
    pub events_path: Option<String>,
    pub socket_addr: Option<String>,
    pub sse_enabled: Option<bool>,
    pub socket_enabled: Option<bool>,
    pub polling_fallback: Option<bool>,
    pub debounce_ms: Option<u64>,
    pub reconnect_base_delay_ms: Option<u64>,
    pub max_reconnect_attempts: Option<u32>,
    pub poll_interval_ms: Option<u64>,
    pub mutation_timeout_ms: Option<u64>,
}

/// Default config file path: `~/.config/wholib/client.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("wholib").join("client.toml"))
}

impl ClientConfig {
    /// Load configuration from the default path with env overrides.
    pub fn load() -> Self {
        let toml = default_config_path()
            .and_then(|p| Self::read_toml(&p).ok())
            .unwrap_or_default();
        Self::from_sources(toml)
    }

    /// Load configuration from an explicit TOML file with env overrides.
    ///
    /// An unreadable or unparseable file is an error; a caller passing an
    /// explicit path expects it to be honored.
    pub fn load_from(path: &Path) -> Result<Self> {
        let toml = Self::read_toml(path)?;
        Ok(Self::from_sources(toml))
    }

    fn read_toml(path: &Path) -> Result<TomlConfig> {
        if !path.exists() {
            warn!("Config file not found: {} (using defaults)", path.display());
            return Ok(TomlConfig::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
    }

    /// Merge compiled defaults, TOML values, and environment overrides.
    fn from_sources(toml: TomlConfig) -> Self {
        let defaults = Self::default();

        let mut config = Self {
            base_url: toml.base_url.unwrap_or(defaults.base_url),
            events_path: toml.events_path.unwrap_or(defaults.events_path),
            socket_addr: toml.socket_addr.or(defaults.socket_addr),
            sse_enabled: toml.sse_enabled.unwrap_or(defaults.sse_enabled),
            socket_enabled: toml.socket_enabled.unwrap_or(defaults.socket_enabled),
            polling_fallback: toml.polling_fallback.unwrap_or(defaults.polling_fallback),
            debounce: toml
                .debounce_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.debounce),
            reconnect_base_delay: toml
                .reconnect_base_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.reconnect_base_delay),
            max_reconnect_attempts: toml
                .max_reconnect_attempts
                .unwrap_or(defaults.max_reconnect_attempts),
            poll_interval: toml
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            mutation_timeout: toml
                .mutation_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.mutation_timeout),
        };

        // Environment overrides (highest priority)
        if let Ok(v) = std::env::var("WHOLIB_BASE_URL") {
            config.base_url = v;
        }
        if let Ok(v) = std::env::var("WHOLIB_EVENTS_PATH") {
            config.events_path = v;
        }
        if let Ok(v) = std::env::var("WHOLIB_SOCKET_ADDR") {
            config.socket_addr = Some(v);
        }
        if let Some(v) = env_bool("WHOLIB_SSE_ENABLED") {
            config.sse_enabled = v;
        }
        if let Some(v) = env_bool("WHOLIB_SOCKET_ENABLED") {
            config.socket_enabled = v;
        }
        if let Some(v) = env_bool("WHOLIB_POLLING_FALLBACK") {
            config.polling_fallback = v;
        }
        if let Some(v) = env_parse::<u64>("WHOLIB_DEBOUNCE_MS") {
            config.debounce = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<u64>("WHOLIB_RECONNECT_BASE_DELAY_MS") {
            config.reconnect_base_delay = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<u32>("WHOLIB_MAX_RECONNECT_ATTEMPTS") {
            config.max_reconnect_attempts = v;
        }
        if let Some(v) = env_parse::<u64>("WHOLIB_POLL_INTERVAL_MS") {
            config.poll_interval = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<u64>("WHOLIB_MUTATION_TIMEOUT_MS") {
            config.mutation_timeout = Duration::from_millis(v);
        }

        config
    }

    /// Validate values that would otherwise misbehave quietly.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(Error::Config("base_url must not be empty".to_string()));
        }
        if !self.sse_enabled && !self.socket_enabled && !self.polling_fallback {
            return Err(Error::Config(
                "at least one transport must be enabled".to_string(),
            ));
        }
        if self.reconnect_base_delay.is_zero() {
            return Err(Error::Config(
                "reconnect_base_delay must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Full URL of the SSE endpoint.
    pub fn events_url(&self) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            self.events_path
        )
    }
}

fn env_bool(name: &str) -> Option<bool> {
    match std::env::var(name) {
        Ok(v) => match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            other => {
                warn!("Ignoring unparseable boolean {}={}", name, other);
                None
            }
        },
        Err(_) => None,
    }
}

/// Parse an env var into its target integer type; out-of-range values are
/// ignored with a warning rather than truncated.
fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    match std::env::var(name) {
        Ok(v) => match v.parse() {
            Ok(n) => Some(n),
            Err(_) => {
                warn!("Ignoring unparseable integer {}={}", name, v);
                None
            }
        },
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.debounce, Duration::from_millis(100));
        assert_eq!(config.max_reconnect_attempts, 10);
        assert!(config.polling_fallback);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_events_url_joins_cleanly() {
        let config = ClientConfig {
            base_url: "http://localhost:8000/".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.events_url(),
            "http://localhost:8000/api/library/events"
        );
    }

    #[test]
    fn test_validate_rejects_all_transports_disabled() {
        let config = ClientConfig {
            sse_enabled: false,
            socket_enabled: false,
            polling_fallback: false,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_base_delay() {
        let config = ClientConfig {
            reconnect_base_delay: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_fills_from_defaults() {
        let toml: TomlConfig =
            toml::from_str("base_url = \"http://tardis:9000\"\ndebounce_ms = 250\n").unwrap();
        let config = ClientConfig::from_sources(toml);
        assert_eq!(config.base_url, "http://tardis:9000");
        assert_eq!(config.debounce, Duration::from_millis(250));
        // Untouched fields keep compiled defaults
        assert_eq!(config.max_reconnect_attempts, 10);
    }
}
