//! Configuration for ZapCast

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database configuration
    pub database: DatabaseConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Outbound messaging gateway configuration
    pub gateway: GatewayConfig,

    /// Warmup engine defaults
    #[serde(default)]
    pub warmup: WarmupConfigSection,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL (postgres)
    pub url: String,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// API port
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_api_port(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

/// Messaging gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway base URL
    pub url: String,

    /// Gateway API key, sent as the `apikey` header
    pub api_key: String,

    /// Request timeout in seconds. Media uploads can be large, hence the
    /// generous default.
    #[serde(default = "default_gateway_timeout")]
    pub timeout_secs: u64,

    /// Maximum attempts for one send before it is surfaced as a failure
    #[serde(default = "default_gateway_max_attempts")]
    pub max_attempts: u32,

    /// Fixed pause between retry attempts, in seconds
    #[serde(default = "default_gateway_retry_delay")]
    pub retry_delay_secs: u64,

    /// Country prefix prepended to bare phone numbers
    #[serde(default = "default_country_prefix")]
    pub default_country_prefix: String,
}

fn default_gateway_timeout() -> u64 {
    120
}

fn default_gateway_max_attempts() -> u32 {
    3
}

fn default_gateway_retry_delay() -> u64 {
    5
}

fn default_country_prefix() -> String {
    "55".to_string()
}

/// Warmup engine defaults, overridable per request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmupConfigSection {
    /// Chance of targeting the shared group instead of direct chats (0-1)
    #[serde(default = "default_group_chance")]
    pub group_chance: f64,

    /// Chance of targeting external seed numbers instead of peers (0-1)
    #[serde(default = "default_external_numbers_chance")]
    pub external_numbers_chance: f64,

    /// Shared group jid used when group sending is drawn
    #[serde(default)]
    pub group_id: Option<String>,

    /// Built-in external seed numbers
    #[serde(default)]
    pub external_numbers: Vec<String>,
}

impl Default for WarmupConfigSection {
    fn default() -> Self {
        Self {
            group_chance: default_group_chance(),
            external_numbers_chance: default_external_numbers_chance(),
            group_id: None,
            external_numbers: Vec::new(),
        }
    }
}

fn default_group_chance() -> f64 {
    0.3
}

fn default_external_numbers_chance() -> f64 {
    0.4
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (overridden by RUST_LOG)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON-formatted logs
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Load configuration from environment and file
    pub fn load() -> crate::Result<Self> {
        if let Ok(path) = std::env::var("ZAPCAST_CONFIG") {
            return Self::from_file(std::path::Path::new(&path));
        }

        let paths = [
            std::path::PathBuf::from("./config.toml"),
            std::path::PathBuf::from("/etc/zapcast/config.toml"),
        ];

        for path in paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(crate::Error::Config(
            "No configuration file found".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
            [database]
            url = "postgres://localhost/zapcast"

            [gateway]
            url = "https://gateway.example.com"
            api_key = "secret"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.gateway.max_attempts, 3);
        assert_eq!(config.gateway.default_country_prefix, "55");
        assert_eq!(config.warmup.group_chance, 0.3);
    }

    #[test]
    fn test_gateway_overrides() {
        let toml = r#"
            [database]
            url = "postgres://localhost/zapcast"

            [gateway]
            url = "https://gateway.example.com"
            api_key = "secret"
            max_attempts = 5
            retry_delay_secs = 2
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.gateway.max_attempts, 5);
        assert_eq!(config.gateway.retry_delay_secs, 2);
    }
}
