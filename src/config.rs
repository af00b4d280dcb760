use std::env;
use std::str::FromStr;
use std::time::Duration;

use dotenvy::dotenv;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has an invalid value: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,

    // Rate limiting
    pub rate_protected_per_min: u32,

    pub api_prefix: String,

    // Record store
    pub db_max_connections: u32,
    pub store_timeout: Duration,
    pub store_read_retries: usize,

    // Realtime
    pub redis_url: Option<String>,
    pub relay_connect_timeout: Duration,
    pub realtime_throttle: Duration,

    // Logging
    pub log_dir: String,
    pub log_level: tracing::Level,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_source(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup, so tests don't have to touch the
    /// process environment.
    pub fn from_source<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| lookup(key).ok_or(ConfigError::Missing(key));

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,

            rate_protected_per_min: parse_or(&lookup, "RATE_PROTECTED_PER_MIN", 1000)?,

            api_prefix: lookup("API_PREFIX").unwrap_or_else(|| "/api".to_string()),

            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 10)?,
            store_timeout: Duration::from_millis(parse_or(&lookup, "STORE_TIMEOUT_MS", 5000)?),
            store_read_retries: parse_or(&lookup, "STORE_READ_RETRIES", 2)?,

            redis_url: lookup("REDIS_URL").filter(|url| !url.trim().is_empty()),
            relay_connect_timeout: Duration::from_millis(parse_or(
                &lookup,
                "RELAY_CONNECT_TIMEOUT_MS",
                2000,
            )?),
            realtime_throttle: Duration::from_millis(parse_or(
                &lookup,
                "REALTIME_THROTTLE_MS",
                1000,
            )?),

            log_dir: lookup("LOG_DIR").unwrap_or_else(|| "logs".to_string()),
            log_level: parse_or(&lookup, "LOG_LEVEL", tracing::Level::DEBUG)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn source(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("SERVER_ADDR", "127.0.0.1:8080"),
        ("DATABASE_URL", "mysql://localhost/hrm"),
        ("JWT_SECRET", "secret"),
    ];

    #[test]
    fn defaults_apply_when_optional_keys_are_missing() {
        let config = Config::from_source(source(&REQUIRED)).unwrap();

        assert_eq!(config.api_prefix, "/api");
        assert_eq!(config.store_timeout, Duration::from_secs(5));
        assert_eq!(config.store_read_retries, 2);
        assert_eq!(config.realtime_throttle, Duration::from_secs(1));
        assert!(config.redis_url.is_none());
        assert_eq!(config.log_level, tracing::Level::DEBUG);
    }

    #[test]
    fn missing_required_key_is_reported() {
        let err = Config::from_source(source(&REQUIRED[..2])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("JWT_SECRET")));
    }

    #[test]
    fn malformed_number_is_an_error() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("STORE_TIMEOUT_MS", "soon"));

        let err = Config::from_source(source(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "STORE_TIMEOUT_MS", .. }));
    }

    #[test]
    fn blank_redis_url_means_no_relay() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("REDIS_URL", "  "));
        pairs.push(("LOG_LEVEL", "warn"));

        let config = Config::from_source(source(&pairs)).unwrap();
        assert!(config.redis_url.is_none());
        assert_eq!(config.log_level, tracing::Level::WARN);
    }
}
