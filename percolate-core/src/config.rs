use config::{Config, File};
use serde::Deserialize;

use crate::error::PercolateError;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PercolateConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub presence: PresenceConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub socket_path: String,
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            socket_path: "/tmp/percolate.sock".to_string(),
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8970,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    /// Per-session lock acquisition timeout; exceeded → `Busy`.
    pub lock_timeout_ms: u64,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 250,
            default_page_size: 50,
            max_page_size: 200,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PresenceConfig {
    /// Disconnect grace period before a participant is marked inactive.
    pub grace_period_ms: u64,
    /// Interval of the background eviction sweep.
    pub sweep_interval_seconds: u64,
    /// Inactive entries older than this are evicted from the in-memory index.
    pub idle_eviction_minutes: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: 15_000,
            sweep_interval_seconds: 60,
            idle_eviction_minutes: 30,
        }
    }
}

impl PercolateConfig {
    /// Load from a TOML file; missing file falls back to defaults so the
    /// server can run unconfigured in dev.
    pub fn load(path: &str) -> Result<Self, PercolateError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .build()?;
        Ok(s.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let c = PercolateConfig::default();
        assert!(c.gateway.lock_timeout_ms > 0);
        assert!(c.presence.grace_period_ms > 0);
        assert!(c.gateway.default_page_size <= c.gateway.max_page_size);
        assert!(c.http.enabled);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let c = PercolateConfig::load("/nonexistent/percolate.toml")
            .expect("missing config file should not be fatal");
        assert_eq!(c.service.socket_path, "/tmp/percolate.sock");
    }
}
