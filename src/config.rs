use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::{debug, info};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Runtime settings, read from the environment (and `.env` via dotenvy).
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Unset means the in-memory store with a demo catalog.
    pub database_url: Option<String>,
    /// Unset means the in-process cache.
    pub redis_url: Option<String>,
    pub db_max_connections: u32,

    pub coupon_dir: PathBuf,
    pub coupon_files: Vec<String>,
    pub promo_quorum: usize,

    pub catalog_cache_ttl: Duration,
    pub order_cache_ttl: Duration,
    pub promo_cache_ttl: Duration,

    pub operation_timeout: Duration,
    pub cache_timeout: Duration,

    /// 0 disables the exporter.
    pub metrics_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => info!(path = %path.display(), "Loaded .env file"),
            Err(e) => debug!(error = %e, "No .env file loaded"),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let optional = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let coupon_files: Vec<String> = optional("COUPON_FILES")
            .unwrap_or_else(|| "couponbase1.txt,couponbase2.txt,couponbase3.txt".to_string())
            .split(',')
            .map(str::trim)
            .filter(|file| !file.is_empty())
            .map(str::to_string)
            .collect();

        let config = Self {
            database_url: optional("DATABASE_URL"),
            redis_url: optional("REDIS_URL"),
            db_max_connections: try_load(&lookup, "DB_MAX_CONNECTIONS", "10")?,
            coupon_dir: PathBuf::from(optional("COUPON_DIR").unwrap_or_else(|| ".".to_string())),
            promo_quorum: try_load(&lookup, "PROMO_QUORUM", "2")?,
            coupon_files,
            catalog_cache_ttl: Duration::from_secs(try_load(&lookup, "CATALOG_CACHE_TTL_SECS", "600")?),
            order_cache_ttl: Duration::from_secs(try_load(&lookup, "ORDER_CACHE_TTL_SECS", "600")?),
            promo_cache_ttl: Duration::from_secs(try_load(&lookup, "PROMO_CACHE_TTL_SECS", "86400")?),
            operation_timeout: Duration::from_millis(try_load(&lookup, "OPERATION_TIMEOUT_MS", "5000")?),
            cache_timeout: Duration::from_millis(try_load(&lookup, "CACHE_TIMEOUT_MS", "250")?),
            metrics_port: try_load(&lookup, "METRICS_PORT", "9090")?,
        };

        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.promo_quorum == 0 || self.promo_quorum > self.coupon_files.len() {
            return Err(ConfigError::Invalid {
                key: "PROMO_QUORUM",
                value: self.promo_quorum.to_string(),
                reason: format!("must be between 1 and {}", self.coupon_files.len()),
            });
        }
        if self.db_max_connections == 0 {
            return Err(ConfigError::Invalid {
                key: "DB_MAX_CONNECTIONS",
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    pub fn coupon_paths(&self) -> Vec<PathBuf> {
        self.coupon_files
            .iter()
            .map(|file| self.coupon_dir.join(file))
            .collect()
    }
}

fn try_load<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: &str,
) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    let value = lookup(key).unwrap_or_else(|| {
        debug!("{key} not set, using default: {default}");
        default.to_string()
    });

    let parsed = value.trim().parse::<T>();
    parsed.map_err(|e| ConfigError::Invalid {
        key,
        reason: e.to_string(),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();

        assert_eq!(config.database_url, None);
        assert_eq!(config.redis_url, None);
        assert_eq!(config.promo_quorum, 2);
        assert_eq!(config.coupon_files.len(), 3);
        assert_eq!(config.catalog_cache_ttl, Duration::from_secs(600));
        assert_eq!(config.order_cache_ttl, Duration::from_secs(600));
        assert_eq!(config.promo_cache_ttl, Duration::from_secs(86_400));
        assert_eq!(config.operation_timeout, Duration::from_secs(5));
        assert_eq!(config.metrics_port, 9090);
        assert_eq!(config.coupon_paths()[0], PathBuf::from("./couponbase1.txt"));
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/food"),
            ("COUPON_DIR", "/srv/coupons"),
            ("COUPON_FILES", "a.txt, b.txt"),
            ("PROMO_QUORUM", "1"),
            ("CACHE_TIMEOUT_MS", "100"),
        ])
        .unwrap();

        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/food"));
        assert_eq!(config.coupon_files, ["a.txt", "b.txt"]);
        assert_eq!(config.coupon_paths()[1], PathBuf::from("/srv/coupons/b.txt"));
        assert_eq!(config.promo_quorum, 1);
        assert_eq!(config.cache_timeout, Duration::from_millis(100));
    }

    #[test]
    fn test_blank_urls_are_unset() {
        let config = load(&[("REDIS_URL", "  ")]).unwrap();
        assert_eq!(config.redis_url, None);
    }

    #[test]
    fn test_unparseable_value_is_rejected() {
        let err = load(&[("METRICS_PORT", "ninety")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "METRICS_PORT", .. }));
    }

    #[test]
    fn test_quorum_must_fit_sources() {
        let err = load(&[("PROMO_QUORUM", "4")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PROMO_QUORUM", .. }));

        let err = load(&[("PROMO_QUORUM", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PROMO_QUORUM", .. }));
    }
}
