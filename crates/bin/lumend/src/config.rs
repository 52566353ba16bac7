//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `lumend.toml` in the working directory (or the path in
//! `LUMEN_CONFIG`). Every field has a sensible default so the file is
//! optional. Environment variables take precedence over file values.

use std::time::Duration;

use serde::Deserialize;

use lumen_app::automation_engine::EngineConfig;
use lumen_app::dispatcher::DispatcherConfig;
use lumen_app::telemetry::TelemetryConfig;

/// Config file read when `LUMEN_CONFIG` is not set.
pub const DEFAULT_PATH: &str = "lumend.toml";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub telemetry: TelemetrySection,
    pub engine: EngineSection,
    pub dispatcher: DispatcherSection,
    pub heartbeat: HeartbeatConfig,
    pub integrations: IntegrationsConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to (e.g. `0.0.0.0`).
    pub host: String,
    pub port: u16,
}

/// `SQLite` database configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `SQLite` connection URL or file path.
    pub url: String,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TelemetrySection {
    /// Readings retained per device.
    pub capacity: usize,
    /// Undelivered readings buffered per subscriber.
    pub subscriber_buffer: usize,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Readings queued per source device while its rules are evaluated.
    pub device_queue: usize,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DispatcherSection {
    pub workers: usize,
    pub queue_capacity: usize,
    pub attempt_timeout_ms: u64,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
}

/// Missed-heartbeat detection.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Silence after which an online device is marked offline.
    pub timeout_secs: u64,
    /// How often devices are checked.
    pub interval_secs: u64,
}

/// Per-integration settings.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct IntegrationsConfig {
    #[serde(rename = "virtual")]
    pub virtual_devices: VirtualConfig,
}

/// Simulated devices seeded at startup.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct VirtualConfig {
    pub enabled: bool,
    pub poll_interval_secs: u64,
    pub actuator_latency_ms: u64,
    /// Ids of the simulated light sensors.
    pub sensors: Vec<String>,
    /// Ids of the simulated curtains.
    pub curtains: Vec<String>,
}

impl Config {
    /// Load configuration from `LUMEN_CONFIG` or `lumend.toml` (if present)
    /// then apply environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("LUMEN_CONFIG").unwrap_or_else(|_| DEFAULT_PATH.to_string());
        let mut config = Self::from_file(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    /// Apply overrides looked up by variable name.
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("LUMEN_HOST") {
            self.server.host = val;
        }
        if let Some(port) = var("LUMEN_PORT").and_then(|val| val.parse().ok()) {
            self.server.port = port;
        }
        if let Some(val) = var("LUMEN_BIND")
            && let Some((host, port)) = val.rsplit_once(':')
        {
            self.server.host = host.to_string();
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Some(val) = var("LUMEN_DATABASE_URL") {
            self.database.url = val;
        }
        if let Some(val) = var("LUMEN_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    /// Reject settings the runtime cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Validation(msg.to_string()));
        if self.server.port == 0 {
            return invalid("server.port must be non-zero");
        }
        if self.database.url.trim().is_empty() {
            return invalid("database.url must not be empty");
        }
        if self.telemetry.capacity == 0 || self.telemetry.subscriber_buffer == 0 {
            return invalid("telemetry capacities must be non-zero");
        }
        if self.engine.device_queue == 0 {
            return invalid("engine.device_queue must be non-zero");
        }
        if self.dispatcher.workers == 0 {
            return invalid("dispatcher.workers must be non-zero");
        }
        if self.dispatcher.queue_capacity == 0 {
            return invalid("dispatcher.queue_capacity must be non-zero");
        }
        if self.dispatcher.max_attempts == 0 {
            return invalid("dispatcher.max_attempts must be non-zero");
        }
        if self.heartbeat.interval_secs == 0 {
            return invalid("heartbeat.interval_secs must be non-zero");
        }
        if self.integrations.virtual_devices.enabled
            && self.integrations.virtual_devices.poll_interval_secs == 0
        {
            return invalid("integrations.virtual.poll_interval_secs must be non-zero");
        }
        Ok(())
    }

    /// Return the `host:port` bind address.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    #[must_use]
    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            capacity: self.telemetry.capacity,
            subscriber_buffer: self.telemetry.subscriber_buffer,
        }
    }

    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            device_queue: self.engine.device_queue,
        }
    }

    #[must_use]
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            workers: self.dispatcher.workers,
            queue_capacity: self.dispatcher.queue_capacity,
            attempt_timeout: Duration::from_millis(self.dispatcher.attempt_timeout_ms),
            max_attempts: self.dispatcher.max_attempts,
            backoff_base: Duration::from_millis(self.dispatcher.backoff_base_ms),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://lumen.db?mode=rwc".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl Default for TelemetrySection {
    fn default() -> Self {
        let defaults = TelemetryConfig::default();
        Self {
            capacity: defaults.capacity,
            subscriber_buffer: defaults.subscriber_buffer,
        }
    }
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            device_queue: EngineConfig::default().device_queue,
        }
    }
}

impl Default for DispatcherSection {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 64,
            attempt_timeout_ms: 5_000,
            max_attempts: 3,
            backoff_base_ms: 200,
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            interval_secs: 30,
        }
    }
}

impl Default for VirtualConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            poll_interval_secs: 10,
            actuator_latency_ms: 150,
            sensors: vec!["virtual-lux-1".to_string()],
            curtains: vec!["virtual-curtain-1".to_string()],
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
