//! Process configuration loaded from the environment (and `.env`, when present).

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// `None` runs on in-memory stores.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub finalizer_enabled: bool,
    pub finalizer_interval: Duration,
    pub job_poll_interval: Duration,
    /// How long a claimed job stays leased before another executor may reclaim it.
    pub job_lease: Duration,
    pub refund_max_attempts: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            database_url: None,
            db_max_connections: 10,
            finalizer_enabled: true,
            finalizer_interval: Duration::from_secs(60),
            job_poll_interval: Duration::from_millis(200),
            job_lease: Duration::from_secs(300),
            refund_max_attempts: 5,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is fine.
        dotenvy::dotenv().ok();
        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        tracing::info!(
            bind_addr = %config.bind_addr,
            database = config.database_url.is_some(),
            finalizer_enabled = config.finalizer_enabled,
            finalizer_interval_secs = config.finalizer_interval.as_secs(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Build from an arbitrary key lookup; unset or blank keys take their defaults.
    ///
    /// Counts and intervals must be greater than zero.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        Ok(Self {
            bind_addr: parse(&get, "BIND_ADDR")?.unwrap_or(defaults.bind_addr),
            database_url: get("DATABASE_URL"),
            db_max_connections: positive(&get, "DB_MAX_CONNECTIONS")?.unwrap_or(defaults.db_max_connections),
            finalizer_enabled: flag(&get, "FINALIZER_ENABLED")?.unwrap_or(defaults.finalizer_enabled),
            finalizer_interval: positive(&get, "FINALIZER_INTERVAL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.finalizer_interval),
            job_poll_interval: positive(&get, "JOB_POLL_INTERVAL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.job_poll_interval),
            job_lease: positive(&get, "JOB_LEASE_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.job_lease),
            refund_max_attempts: positive(&get, "REFUND_MAX_ATTEMPTS")?.unwrap_or(defaults.refund_max_attempts),
        })
    }
}

fn parse<T, G>(get: &G, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|value| {
            value.parse::<T>().map_err(|e| ConfigError::Invalid {
                key,
                reason: e.to_string(),
                value,
            })
        })
        .transpose()
}

fn positive<T, G>(get: &G, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr + Default + PartialEq + std::fmt::Display,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match parse::<T, G>(get, key)? {
        Some(n) if n == T::default() => Err(ConfigError::Invalid {
            key,
            value: n.to_string(),
            reason: "must be greater than zero".to_string(),
        }),
        other => Ok(other),
    }
}

fn flag<G>(get: &G, key: &'static str) -> Result<Option<bool>, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|value| match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                key,
                value,
                reason: "expected true or false".to_string(),
            }),
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let env: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        assert_eq!(load(&[]).unwrap(), AppConfig::default());
    }

    #[test]
    fn values_are_parsed() {
        let config = load(&[
            ("BIND_ADDR", "127.0.0.1:3000"),
            ("DATABASE_URL", "postgres://localhost/backoffice"),
            ("FINALIZER_ENABLED", "off"),
            ("FINALIZER_INTERVAL_SECS", "300"),
            ("JOB_POLL_INTERVAL_MS", "50"),
            ("JOB_LEASE_SECS", "900"),
            ("REFUND_MAX_ATTEMPTS", "8"),
        ])
        .unwrap();

        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/backoffice"));
        assert!(!config.finalizer_enabled);
        assert_eq!(config.finalizer_interval, Duration::from_secs(300));
        assert_eq!(config.job_poll_interval, Duration::from_millis(50));
        assert_eq!(config.job_lease, Duration::from_secs(900));
        assert_eq!(config.refund_max_attempts, 8);
    }

    #[test]
    fn blank_database_url_means_in_memory() {
        assert_eq!(load(&[("DATABASE_URL", "  ")]).unwrap().database_url, None);
    }

    #[test]
    fn invalid_values_name_the_key() {
        let err = load(&[("FINALIZER_INTERVAL_SECS", "soon")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "FINALIZER_INTERVAL_SECS", .. }));

        let err = load(&[("FINALIZER_ENABLED", "maybe")]).unwrap_err();
        assert!(err.to_string().contains("FINALIZER_ENABLED"));
    }

    #[test]
    fn zero_counts_and_intervals_are_rejected() {
        for key in [
            "DB_MAX_CONNECTIONS",
            "FINALIZER_INTERVAL_SECS",
            "JOB_POLL_INTERVAL_MS",
            "JOB_LEASE_SECS",
            "REFUND_MAX_ATTEMPTS",
        ] {
            let err = load(&[(key, "0")]).unwrap_err();
            let ConfigError::Invalid { key: rejected, value, .. } = err;
            assert_eq!(rejected, key);
            assert_eq!(value, "0");
        }

        assert_eq!(load(&[("FINALIZER_INTERVAL_SECS", "1")]).unwrap().finalizer_interval, Duration::from_secs(1));
    }
}
