// Configuration module

pub mod duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::constants::{DEFAULT_COLLECTION_TIME, DEFAULT_LISTEN_ADDRESS};
use crate::error::MetricsError;
pub use duration::parse_duration;

/// Key of the metrics section inside an `extra_config` bag
pub const NAMESPACE: &str = "gatewatch/metrics";

/// Free-form per-component configuration, keyed by namespace
pub type ExtraConfig = HashMap<String, serde_json::Value>;

/// Options of the metrics collector
///
/// Built once at startup and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsConfig {
    pub proxy_disabled: bool,
    pub router_disabled: bool,
    pub backend_disabled: bool,
    pub endpoint_disabled: bool,
    pub collection_time: Duration,
    pub listen_address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            proxy_disabled: false,
            router_disabled: false,
            backend_disabled: false,
            endpoint_disabled: false,
            collection_time: DEFAULT_COLLECTION_TIME,
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
        }
    }
}

impl MetricsConfig {
    /// Read the metrics section of `extra`
    ///
    /// Returns `None` when the section is missing or is not an object, which
    /// leaves the collector inert. Inside the section every option is read
    /// leniently: a value of the wrong type or an unparsable duration keeps
    /// the default.
    pub fn from_extra_config(extra: &ExtraConfig) -> Option<Self> {
        let section = extra.get(NAMESPACE)?.as_object()?;
        let mut cfg = Self::default();

        let flag = |key: &str| section.get(key).and_then(serde_json::Value::as_bool);
        if let Some(v) = flag("proxy_disabled") {
            cfg.proxy_disabled = v;
        }
        if let Some(v) = flag("router_disabled") {
            cfg.router_disabled = v;
        }
        if let Some(v) = flag("backend_disabled") {
            cfg.backend_disabled = v;
        }
        if let Some(v) = flag("endpoint_disabled") {
            cfg.endpoint_disabled = v;
        }

        if let Some(raw) = section.get("collection_time").and_then(|v| v.as_str()) {
            match parse_duration(raw) {
                // a zero period would make the aggregator spin
                Ok(d) if !d.is_zero() => cfg.collection_time = d,
                Ok(_) => {
                    tracing::warn!(collection_time = raw, "Zero collection_time ignored, using default");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Invalid collection_time ignored, using default");
                }
            }
        }

        if let Some(addr) = section.get("listen_address").and_then(|v| v.as_str()) {
            if !addr.trim().is_empty() {
                cfg.listen_address = addr.trim().to_string();
            }
        }

        Some(cfg)
    }

    /// Address handed to the listener
    ///
    /// A leading `:` (`":8090"`) binds every interface. Host names are kept
    /// as-is and resolved when the endpoint binds.
    pub fn bind_address(&self) -> String {
        if self.listen_address.starts_with(':') {
            format!("0.0.0.0{}", self.listen_address)
        } else {
            self.listen_address.clone()
        }
    }
}

/// Endpoint definition handed to proxy and handler factories
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Route pattern, also the label of the endpoint's metrics
    pub endpoint: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
}

fn default_method() -> String {
    "GET".to_string()
}

/// Backend definition handed to backend factories
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Path template on the backend, also the label of its metrics
    pub url_pattern: String,
    #[serde(default)]
    pub host: Vec<String>,
}

/// Configuration file of the `gatewatch` binary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
    #[serde(default)]
    pub extra_config: ExtraConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ServiceConfig {
    /// Parse YAML, substituting `${VAR_NAME}` with environment variables
    pub fn from_yaml_with_env(yaml: &str) -> Result<Self, MetricsError> {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
            .map_err(|e| MetricsError::Config(e.to_string()))?;

        let mut missing = Vec::new();
        let substituted = re.replace_all(yaml, |caps: &regex::Captures| {
            match std::env::var(&caps[1]) {
                Ok(value) => value,
                Err(_) => {
                    missing.push(caps[1].to_string());
                    String::new()
                }
            }
        });
        if let Some(var_name) = missing.first() {
            return Err(MetricsError::Config(format!(
                "Environment variable '{}' is referenced but not set",
                var_name
            )));
        }

        serde_yaml::from_str(&substituted).map_err(|e| MetricsError::Config(e.to_string()))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, MetricsError> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| MetricsError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml_with_env(&yaml)
    }

    /// Metrics section of this file, if any
    pub fn metrics(&self) -> Option<MetricsConfig> {
        MetricsConfig::from_extra_config(&self.extra_config)
    }
}
