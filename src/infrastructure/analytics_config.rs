//! Configuration for the analytics engine, loaded the same way the legacy
//! `infrastructure::config::Config` loads its settings — layered file/env
//! sources via the `config` crate, with explicit fallbacks to the bare
//! environment variables the deployment docs promise (`MONGO_URI`, `PORT`,
//! `TZ`, `DEBUG_PIVOT`).

use std::env;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AnalyticsConfig {
    pub mongo_uri: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_tz")]
    pub tz: String,
    #[serde(default)]
    pub debug_pivot: bool,
    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,
    #[serde(default = "default_cache_capacity")]
    pub cache_soft_capacity: usize,
    #[serde(default = "default_aggregation_timeout_seconds")]
    pub aggregation_timeout_seconds: u64,
}

impl AnalyticsConfig {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("ANALYTICS").separator("__"));
        let cfg = builder.build()?;
        let mut parsed: AnalyticsConfig = match cfg.try_deserialize() {
            Ok(parsed) => parsed,
            Err(_) => AnalyticsConfig {
                mongo_uri: String::new(),
                port: default_port(),
                tz: default_tz(),
                debug_pivot: false,
                cache_ttl_seconds: default_cache_ttl_seconds(),
                cache_soft_capacity: default_cache_capacity(),
                aggregation_timeout_seconds: default_aggregation_timeout_seconds(),
            },
        };

        if parsed.mongo_uri.trim().is_empty() {
            parsed.mongo_uri = env::var("MONGO_URI").map_err(|_| {
                config::ConfigError::Message(
                    "Missing MongoDB connection string. Set MONGO_URI.".into(),
                )
            })?;
        }

        if let Ok(port) = env::var("PORT") {
            if let Ok(port) = port.parse() {
                parsed.port = port;
            }
        }

        if let Ok(tz) = env::var("TZ") {
            if !tz.trim().is_empty() {
                parsed.tz = tz;
            }
        }

        if let Ok(flag) = env::var("DEBUG_PIVOT") {
            parsed.debug_pivot = flag == "true" || flag == "1";
        }

        Ok(parsed)
    }

    pub fn bind_address(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    /// Bounds a single aggregation round-trip. The HTTP layer inherits a
    /// request timeout from its own configuration in most deployments; this
    /// is the engine-level fallback `SPEC_FULL.md` §5 requires regardless.
    pub fn aggregation_timeout(&self) -> Duration {
        Duration::from_secs(self.aggregation_timeout_seconds)
    }
}

fn default_port() -> u16 {
    3000
}

fn default_tz() -> String {
    "America/Denver".to_string()
}

fn default_cache_ttl_seconds() -> u64 {
    600
}

fn default_cache_capacity() -> usize {
    100
}

fn default_aggregation_timeout_seconds() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env_vars() {
        env::remove_var("MONGO_URI");
        env::remove_var("ANALYTICS__MONGO_URI");
        env::remove_var("PORT");
        env::remove_var("TZ");
        env::remove_var("DEBUG_PIVOT");
    }

    #[test]
    #[serial]
    fn defaults_port_and_timezone_when_unset() {
        clear_env_vars();
        env::set_var("MONGO_URI", "mongodb://localhost:27017");

        let config = AnalyticsConfig::from_env().expect("expected configuration to load");

        assert_eq!(config.port, 3000);
        assert_eq!(config.tz, "America/Denver");
        assert!(!config.debug_pivot);
        assert_eq!(config.aggregation_timeout_seconds, 30);

        clear_env_vars();
    }

    #[test]
    #[serial]
    fn errors_when_mongo_uri_missing() {
        clear_env_vars();

        let error = AnalyticsConfig::from_env().expect_err("expected configuration to fail");

        match error {
            config::ConfigError::Message(message) => {
                assert_eq!(message, "Missing MongoDB connection string. Set MONGO_URI.")
            }
            other => panic!("unexpected error: {:?}", other),
        }

        clear_env_vars();
    }

    #[test]
    #[serial]
    fn reads_debug_pivot_flag() {
        clear_env_vars();
        env::set_var("MONGO_URI", "mongodb://localhost:27017");
        env::set_var("DEBUG_PIVOT", "true");

        let config = AnalyticsConfig::from_env().expect("expected configuration to load");
        assert!(config.debug_pivot);

        clear_env_vars();
    }
}
