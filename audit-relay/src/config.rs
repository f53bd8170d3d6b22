//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//! 1. Environment variables (prefix: AUDIT_RELAY_, nested keys split on `__`)
//! 2. Current working directory: ./config.toml
//! 3. System directory: /etc/audit-relay/{service_name}/config.toml
//! 4. Default values
//!
//! Broker switches are not part of [`Config`]. They are read through the
//! [`ConfigStore`] key-value interface (`config.kafka.*` keys) exactly once,
//! when the pipeline is built.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::broker::{parse_bootstrap_servers, ProducerSettings};
use crate::error::{Error, Result};
use crate::formatter::EventKind;

/// Keys read from the [`ConfigStore`]
pub mod keys {
    /// Forward log envelopes to the broker
    pub const ENABLE_LOG_KAFKA: &str = "config.kafka.enable-log-kafka";
    /// Forward audit envelopes to the broker (also switches request auditing on)
    pub const ENABLE_AUDIT_KAFKA: &str = "config.kafka.enable-audit-kafka";
    /// Comma-separated broker bootstrap list
    pub const SERVER_DETAILS: &str = "config.kafka.server-details";
    pub const LOG_TOPIC: &str = "config.kafka.log-topic";
    pub const AUDIT_TOPIC: &str = "config.kafka.audit-topic";
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service configuration
    pub service: ServiceConfig,

    /// Ordered sink configuration
    #[serde(default)]
    pub sink: SinkConfig,

    /// Request/response audit configuration
    #[serde(default)]
    pub audit: AuditConfig,

    /// Broker producer tuning
    #[serde(default)]
    pub producer: ProducerSettings,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name, stamped on every log envelope
    pub name: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Subscriber output: "json" or "text"
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

/// Ordered sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Upper bound on the shutdown drain, in seconds
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_secs: u64,

    /// Pretty-print envelopes instead of one line per event
    #[serde(default)]
    pub pretty_json: bool,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            drain_timeout_secs: default_drain_timeout(),
            pretty_json: false,
        }
    }
}

impl SinkConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

/// Request/response audit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// JSON field of the request body holding the business reference number
    #[serde(default = "default_reference_field")]
    pub reference_field: String,

    /// Largest request body buffered for auditing, in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Routes never audited (default: ["/health", "/ready", "/metrics"])
    #[serde(default = "default_excluded_routes")]
    pub excluded_routes: Vec<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            reference_field: default_reference_field(),
            max_body_bytes: default_max_body_bytes(),
            excluded_routes: default_excluded_routes(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_drain_timeout() -> u64 {
    5
}

fn default_reference_field() -> String {
    "refNo".to_string()
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024 // 10 MB
}

fn default_excluded_routes() -> Vec<String> {
    vec![
        "/health".to_string(),
        "/ready".to_string(),
        "/metrics".to_string(),
    ]
}

impl Config {
    /// Load configuration from all sources
    ///
    /// The service name is inferred from the binary name.
    pub fn load() -> Result<Self> {
        let service_name = std::env::current_exe()
            .ok()
            .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "audit-relay".to_string());

        Self::load_for_service(&service_name)
    }

    /// Load configuration for a specific service name
    pub fn load_for_service(service_name: &str) -> Result<Self> {
        let config = Self::figment_for_service(service_name).extract()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    ///
    /// Useful for testing or non-standard deployments.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config = Self::figment_from(path).extract()?;
        Ok(config)
    }

    /// The layered figment behind [`Config::load_for_service`]
    ///
    /// Wrap it in a [`FigmentStore`] to read `config.kafka.*` keys from the
    /// same sources.
    pub fn figment_for_service(service_name: &str) -> Figment {
        let config_paths = Self::find_config_paths(service_name);

        tracing::debug!("Searching for config files in order:");
        for path in &config_paths {
            tracing::debug!("  - {}", path.display());
        }

        let mut defaults = Config::default();
        defaults.service.name = service_name.to_string();
        let mut figment = Figment::new().merge(Serialized::defaults(defaults));

        // Lowest priority first so that higher priority files override
        for path in config_paths.iter().rev() {
            if path.exists() {
                tracing::info!("Loading configuration from: {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
        }

        figment.merge(Env::prefixed("AUDIT_RELAY_").split("__"))
    }

    /// Figment for a single file plus environment overrides
    pub fn figment_from(path: impl AsRef<Path>) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("AUDIT_RELAY_").split("__"))
    }

    /// Config file paths for a service, highest priority first
    fn find_config_paths(service_name: &str) -> Vec<PathBuf> {
        vec![
            PathBuf::from("config.toml"),
            PathBuf::from("/etc/audit-relay")
                .join(service_name)
                .join("config.toml"),
        ]
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                name: "audit-relay".to_string(),
                log_level: default_log_level(),
                log_format: default_log_format(),
            },
            sink: SinkConfig::default(),
            audit: AuditConfig::default(),
            producer: ProducerSettings::default(),
        }
    }
}

/// Key-value configuration lookup
///
/// Values are resolved once, when components are constructed.
pub trait ConfigStore: Send + Sync {
    /// Raw value for `key`, if present
    fn get_string(&self, key: &str) -> Option<String>;

    /// Boolean value for `key`
    ///
    /// Anything other than `true`/`false` (case-insensitive) is a
    /// configuration error.
    fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.get_string(key) {
            Some(raw) => parse_bool(key, &raw).map(Some),
            None => Ok(None),
        }
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(Error::Configuration(format!(
            "{key} must be true or false, got '{raw}'"
        ))),
    }
}

/// [`ConfigStore`] over a figment (TOML files, environment)
#[derive(Debug, Clone)]
pub struct FigmentStore {
    figment: Figment,
}

impl FigmentStore {
    pub fn new(figment: Figment) -> Self {
        Self { figment }
    }

    /// Store backed by a single TOML file
    pub fn from_toml(path: impl AsRef<Path>) -> Self {
        Self::new(Figment::new().merge(Toml::file(path.as_ref())))
    }
}

impl ConfigStore for FigmentStore {
    fn get_string(&self, key: &str) -> Option<String> {
        if let Ok(value) = self.figment.extract_inner::<String>(key) {
            return Some(value);
        }
        if let Ok(value) = self.figment.extract_inner::<bool>(key) {
            return Some(value.to_string());
        }
        self.figment
            .extract_inner::<i64>(key)
            .ok()
            .map(|value| value.to_string())
    }
}

/// In-memory [`ConfigStore`]
#[derive(Debug, Clone, Default)]
pub struct MapStore {
    entries: BTreeMap<String, String>,
}

impl MapStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a key
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapStore {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl ConfigStore for MapStore {
    fn get_string(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }
}

/// Broker forwarding settings for one event kind
///
/// Immutable for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BrokerConfig {
    pub enabled: bool,
    pub bootstrap_servers: String,
    pub topic: String,
}

impl BrokerConfig {
    /// Forwarding switched off
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Resolve the settings for `kind` from `store`
    ///
    /// When forwarding is enabled, a missing or malformed bootstrap list or
    /// topic is a fatal configuration error.
    pub fn resolve(store: &dyn ConfigStore, kind: EventKind) -> Result<Self> {
        let (enable_key, topic_key) = match kind {
            EventKind::Log => (keys::ENABLE_LOG_KAFKA, keys::LOG_TOPIC),
            EventKind::Audit => (keys::ENABLE_AUDIT_KAFKA, keys::AUDIT_TOPIC),
        };

        if !store.get_bool(enable_key)?.unwrap_or(false) {
            return Ok(Self::disabled());
        }

        let bootstrap_servers = required(store, keys::SERVER_DETAILS, enable_key)?;
        parse_bootstrap_servers(&bootstrap_servers)?;

        let topic = required(store, topic_key, enable_key)?;
        if topic.chars().any(|c| c.is_whitespace() || c == '*' || c == '>') {
            return Err(Error::Configuration(format!(
                "{topic_key} '{topic}' is not a valid topic name"
            )));
        }

        Ok(Self {
            enabled: true,
            bootstrap_servers,
            topic,
        })
    }
}

fn required(store: &dyn ConfigStore, key: &str, enable_key: &str) -> Result<String> {
    store
        .get_string(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            Error::Configuration(format!(
                "{key} is required when {enable_key} is true. \
                 Provide the broker bootstrap servers and topic details"
            ))
        })
}
