//! Server configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (PAGER_HOST, PAGER_PORT)
//! - TOML configuration file

use anyhow::{Context, Result};
use pager_core::{FileStore, HubConfig, MemoryStore, MessageStore, ValidationLimits};
use pager_transport::StreamConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Event stream configuration.
    #[serde(default)]
    pub stream: StreamSection,

    /// Input limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Latest-message storage.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Event stream configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSection {
    /// Path of the event stream endpoint.
    #[serde(default = "default_stream_path")]
    pub path: String,

    /// Keep-alive comment interval in milliseconds. Zero disables it.
    #[serde(default = "default_keep_alive")]
    pub keep_alive_ms: u64,

    /// Events buffered per subscriber before it counts as lagging.
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

/// Input limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum message length in characters, after trimming.
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,

    /// Maximum correlation identifier length in characters.
    #[serde(default = "default_max_correlation_id_length")]
    pub max_correlation_id_length: usize,
}

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process memory; lost on restart.
    Memory,
    /// A JSON file on disk.
    File,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Which backend holds the latest message.
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,

    /// File path for the `file` backend.
    #[serde(default = "default_storage_path")]
    pub path: String,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    std::env::var("PAGER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_port() -> u16 {
    std::env::var("PAGER_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080)
}

fn default_true() -> bool {
    true
}

fn default_stream_path() -> String {
    "/api/sse".to_string()
}

fn default_keep_alive() -> u64 {
    15_000 // 15 seconds
}

fn default_subscriber_buffer() -> usize {
    pager_core::hub::DEFAULT_SUBSCRIBER_BUFFER
}

fn default_max_message_length() -> usize {
    pager_core::validator::MAX_MESSAGE_LENGTH
}

fn default_max_correlation_id_length() -> usize {
    pager_core::validator::MAX_CORRELATION_ID_LENGTH
}

fn default_backend() -> StorageBackend {
    StorageBackend::Memory
}

fn default_storage_path() -> String {
    "pager-store.json".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            stream: StreamSection::default(),
            limits: LimitsConfig::default(),
            storage: StorageConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            path: default_stream_path(),
            keep_alive_ms: default_keep_alive(),
            subscriber_buffer: default_subscriber_buffer(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_message_length: default_max_message_length(),
            max_correlation_id_length: default_max_correlation_id_length(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_storage_path(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from file or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_paths = [
            "pager.toml",
            "/etc/pager/pager.toml",
            "~/.config/pager/pager.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if `host:port` is not a valid socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let raw = format!("{}:{}", self.host, self.port);
        raw.parse()
            .with_context(|| format!("Invalid bind address: {raw}"))
    }

    /// Validation limits for publish bodies.
    #[must_use]
    pub fn validation_limits(&self) -> ValidationLimits {
        ValidationLimits {
            max_message_length: self.limits.max_message_length,
            max_correlation_id_length: self.limits.max_correlation_id_length,
        }
    }

    /// Hub configuration.
    #[must_use]
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            subscriber_buffer: self.stream.subscriber_buffer.max(1),
        }
    }

    /// Per-connection stream configuration.
    #[must_use]
    pub fn stream_config(&self) -> StreamConfig {
        let keep_alive = match self.stream.keep_alive_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        StreamConfig { keep_alive }
    }

    /// Build the latest-message store for the configured backend.
    #[must_use]
    pub fn message_store(&self) -> MessageStore {
        match self.storage.backend {
            StorageBackend::Memory => MessageStore::new(Arc::new(MemoryStore::new())),
            StorageBackend::File => {
                let path = PathBuf::from(shellexpand::tilde(&self.storage.path).as_ref());
                MessageStore::new(Arc::new(FileStore::new(path)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.stream.path, "/api/sse");
        assert_eq!(config.limits.max_message_length, 50);
        assert_eq!(config.limits.max_correlation_id_length, 100);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn test_config_bind_addr() {
        let config = Config {
            host: "127.0.0.1".into(),
            port: 8080,
            ..Config::default()
        };
        let addr = config.bind_addr().unwrap();
        assert_eq!(addr.port(), 8080);
    }

    #[test]
    fn test_invalid_bind_addr() {
        let config = Config {
            host: "not a host".into(),
            ..Config::default()
        };
        assert!(config.bind_addr().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9000

            [stream]
            keep_alive_ms = 0

            [limits]
            max_message_length = 140

            [storage]
            backend = "file"
            path = "/tmp/pager.json"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.limits.max_message_length, 140);
        assert_eq!(config.limits.max_correlation_id_length, 100);
        assert_eq!(config.storage.backend, StorageBackend::File);
        assert!(config.stream_config().keep_alive.is_none());
        assert_eq!(config.stream.subscriber_buffer, 64);
    }
}
