//! Application configuration.

use serde::Deserialize;
use std::path::Path;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Federation configuration.
    pub federation: FederationConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public URL of this instance.
    pub url: String,
}

/// Federation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FederationConfig {
    /// Whether federation is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Instance name.
    pub instance_name: String,
    /// Whether inbound activities must carry a valid HTTP signature.
    #[serde(default = "default_true")]
    pub require_signatures: bool,
    /// Accepted distance between a request's `Date` header and now, in seconds.
    #[serde(default = "default_max_clock_skew_secs")]
    pub max_clock_skew_secs: i64,
    /// Age after which a cached remote actor profile is refetched, in seconds.
    #[serde(default = "default_actor_refresh_after_secs")]
    pub actor_refresh_after_secs: i64,
    /// Timeout for outgoing federation HTTP requests, in seconds.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            instance_name: "vernissage".to_string(),
            require_signatures: true,
            max_clock_skew_secs: default_max_clock_skew_secs(),
            actor_refresh_after_secs: default_actor_refresh_after_secs(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

const fn default_true() -> bool {
    true
}

const fn default_max_clock_skew_secs() -> i64 {
    5 * 60
}

const fn default_actor_refresh_after_secs() -> i64 {
    2 * 24 * 60 * 60
}

const fn default_http_timeout_secs() -> u64 {
    30
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (based on `VERNISSAGE_ENV`)
    /// 3. Environment variables with `VERNISSAGE_` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let env = std::env::var("VERNISSAGE_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("VERNISSAGE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("VERNISSAGE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_federation_defaults_apply() {
        let config: Config = config::Config::builder()
            .set_override("server.url", "https://vernissage.example")
            .unwrap()
            .set_override("federation.instance_name", "Vernissage")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.server.port, 3000);
        assert!(config.federation.require_signatures);
        assert_eq!(config.federation.max_clock_skew_secs, 300);
        assert_eq!(config.federation.actor_refresh_after_secs, 172_800);
    }
}
