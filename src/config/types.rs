//! Configuration data types.

use crate::health::{
    HttpHealthChecker, NodeHealthChecker, NoopHealthChecker, TcpHealthChecker,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Root configuration for the cluster engine.
///
/// Balancers and nodes are not configured here; they arrive at runtime
/// through the management commands. This covers the engine's own knobs.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModClusterConfig {
    /// Global settings
    #[serde(default)]
    pub global: GlobalConfig,

    /// How often each node is probed
    #[serde(default = "default_health_check_interval", with = "humantime_serde")]
    pub health_check_interval: Duration,

    /// How long a node may stay broken before it is removed; zero disables
    /// removal
    #[serde(default = "default_remove_broken_nodes", with = "humantime_serde")]
    pub remove_broken_nodes: Duration,

    /// Health probe settings
    #[serde(default)]
    pub health_check: ProbeConfig,

    /// Failover-domain cache settings
    #[serde(default)]
    pub failover_cache: FailoverCacheConfig,
}

impl Default for ModClusterConfig {
    fn default() -> Self {
        Self {
            global: GlobalConfig::default(),
            health_check_interval: default_health_check_interval(),
            remove_broken_nodes: default_remove_broken_nodes(),
            health_check: ProbeConfig::default(),
            failover_cache: FailoverCacheConfig::default(),
        }
    }
}

/// Global configuration settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GlobalConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format: json or pretty
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::Json,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Health probe configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProbeConfig {
    /// Type of probe: none, tcp or http
    #[serde(default, rename = "type")]
    pub check_type: ProbeType,

    /// HTTP path to check (for HTTP probes)
    #[serde(default)]
    pub path: Option<String>,

    /// Expected HTTP status code (for HTTP probes)
    #[serde(default = "default_expected_status")]
    pub expected_status: u16,

    /// Probe timeout
    #[serde(default = "default_probe_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            check_type: ProbeType::Tcp,
            path: None,
            expected_status: default_expected_status(),
            timeout: default_probe_timeout(),
        }
    }
}

impl ProbeConfig {
    /// Build the health-checker strategy this configuration describes.
    pub fn build_checker(&self) -> Arc<dyn NodeHealthChecker> {
        match self.check_type {
            ProbeType::None => Arc::new(NoopHealthChecker),
            ProbeType::Tcp => Arc::new(TcpHealthChecker::new(self.timeout)),
            ProbeType::Http => Arc::new(HttpHealthChecker::new(
                self.path.as_deref().unwrap_or("/"),
                self.expected_status,
                self.timeout,
            )),
        }
    }
}

/// Type of health probe.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProbeType {
    None,
    #[default]
    Tcp,
    Http,
}

/// Failover-domain cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FailoverCacheConfig {
    /// Maximum number of remembered routes
    #[serde(default = "default_failover_capacity")]
    pub capacity: usize,

    /// How long a remembered route is valid
    #[serde(default = "default_failover_ttl", with = "humantime_serde")]
    pub ttl: Duration,
}

impl Default for FailoverCacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_failover_capacity(),
            ttl: default_failover_ttl(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_health_check_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_remove_broken_nodes() -> Duration {
    Duration::from_secs(60)
}

fn default_expected_status() -> u16 {
    200
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_failover_capacity() -> usize {
    100
}

fn default_failover_ttl() -> Duration {
    Duration::from_secs(5 * 60)
}

/// Custom serde module for humantime durations.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
