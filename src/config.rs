//! Rahyab configuration
//!
//! The settings layer supplies what a scan needs to start: the test
//! domain, the per-query deadline, the worker count, and the candidate
//! server list. Scan state itself is never persisted.

use crate::probe::DEFAULT_TIMEOUT_SECONDS;
use crate::scanner::{parse_server, DEFAULT_WORKERS};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Scan configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Test domain whose authoritative nameserver answers tunnel queries
    #[serde(default)]
    pub domain: String,

    /// Per-query deadline
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,

    /// Concurrent probe workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Candidate DNS servers, `IPv4[:port]`
    #[serde(default = "default_servers")]
    pub servers: Vec<String>,
}

fn default_timeout() -> Duration {
    Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_servers() -> Vec<String> {
    // Well-known public resolvers as the starting candidate set; users
    // extend this with regional servers from their own network.
    [
        "8.8.8.8",
        "8.8.4.4",
        "1.1.1.1",
        "1.0.0.1",
        "9.9.9.9",
        "149.112.112.112",
        "208.67.222.222",
        "208.67.220.220",
    ]
    .iter()
    .map(|server| server.to_string())
    .collect()
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            domain: String::new(),
            timeout: default_timeout(),
            workers: default_workers(),
            servers: default_servers(),
        }
    }
}

impl ScanConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: &std::path::Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Per-query deadline in whole seconds, floored to one
    pub fn timeout_seconds(&self) -> u64 {
        self.timeout.as_secs().max(1)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.domain.is_empty() {
            return Err("Test domain must be set".to_string());
        }

        if self.servers.is_empty() {
            return Err("At least one candidate server is required".to_string());
        }

        for server in &self.servers {
            if parse_server(server).is_err() {
                return Err(format!("Invalid server address: {}", server));
            }
        }

        if self.timeout.is_zero() {
            return Err("Query timeout must be positive".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ScanConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.workers, DEFAULT_WORKERS);
        assert!(!config.servers.is_empty());
    }

    #[test]
    fn test_config_validation() {
        let mut config = ScanConfig::default();

        // Should fail without a test domain
        assert!(config.validate().is_err());

        config.domain = "t.example.com".to_string();
        assert!(config.validate().is_ok());

        config.servers.push("not-an-address".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timeout_floor() {
        let mut config = ScanConfig::default();
        config.timeout = Duration::from_millis(250);
        assert_eq!(config.timeout_seconds(), 1);
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = ScanConfig::default();
        config.domain = "t.example.com".to_string();

        let encoded = toml::to_string_pretty(&config).unwrap();
        let decoded: ScanConfig = toml::from_str(&encoded).unwrap();

        assert_eq!(decoded.domain, config.domain);
        assert_eq!(decoded.timeout, config.timeout);
        assert_eq!(decoded.servers, config.servers);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let decoded: ScanConfig = toml::from_str("domain = \"t.example.com\"").unwrap();
        assert_eq!(decoded.timeout, Duration::from_secs(3));
        assert_eq!(decoded.workers, DEFAULT_WORKERS);
        assert!(!decoded.servers.is_empty());
    }
}
