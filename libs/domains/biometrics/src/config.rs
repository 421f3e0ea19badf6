use std::time::Duration;

use core_config::{ConfigError, FromEnv, env_parse, env_secs};

/// Tunables for caching, matching, liveness and the embedding engine
#[derive(Debug, Clone, PartialEq)]
pub struct BiometricConfig {
    /// TTL of `tenant:config:{id}` entries
    pub tenant_cache_ttl: Duration,

    /// TTL of enrollment list and per-user entries
    pub encoding_cache_ttl: Duration,

    /// Default maximum cosine distance accepted as a match
    pub match_threshold: f64,

    pub min_face_ratio: f64,
    pub min_det_score: f64,

    /// Bound on every enrollment store call
    pub store_timeout: Duration,

    /// Bound on a single inference (including queueing for a worker)
    pub engine_timeout: Duration,

    /// Concurrent inference slots
    pub engine_workers: usize,

    pub tenant_max_connections: u32,
    pub tenant_min_connections: u32,
}

impl Default for BiometricConfig {
    fn default() -> Self {
        Self {
            tenant_cache_ttl: Duration::from_secs(300),
            encoding_cache_ttl: Duration::from_secs(60),
            match_threshold: 0.35,
            min_face_ratio: 0.15,
            min_det_score: 0.7,
            store_timeout: Duration::from_secs(5),
            engine_timeout: Duration::from_secs(30),
            engine_workers: 2,
            tenant_max_connections: 5,
            tenant_min_connections: 1,
        }
    }
}

impl FromEnv for BiometricConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let engine_workers: usize = env_parse("ENGINE_WORKERS", "2")?;
        if engine_workers == 0 {
            return Err(ConfigError::parse("ENGINE_WORKERS", "must be at least 1"));
        }

        Ok(Self {
            tenant_cache_ttl: env_secs("TENANT_CACHE_TTL", 300)?,
            encoding_cache_ttl: env_secs("ENCODING_CACHE_TTL", 60)?,
            match_threshold: env_parse("FACE_MATCH_THRESHOLD", "0.35")?,
            min_face_ratio: env_parse("LIVENESS_MIN_FACE_RATIO", "0.15")?,
            min_det_score: env_parse("LIVENESS_MIN_DET_SCORE", "0.7")?,
            store_timeout: env_secs("STORE_TIMEOUT_SECS", 5)?,
            engine_timeout: env_secs("ENGINE_TIMEOUT_SECS", 30)?,
            engine_workers,
            tenant_max_connections: env_parse("TENANT_DB_MAX_CONNECTIONS", "5")?,
            tenant_min_connections: env_parse("TENANT_DB_MIN_CONNECTIONS", "1")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEYS: [&str; 10] = [
        "TENANT_CACHE_TTL",
        "ENCODING_CACHE_TTL",
        "FACE_MATCH_THRESHOLD",
        "LIVENESS_MIN_FACE_RATIO",
        "LIVENESS_MIN_DET_SCORE",
        "STORE_TIMEOUT_SECS",
        "ENGINE_TIMEOUT_SECS",
        "ENGINE_WORKERS",
        "TENANT_DB_MAX_CONNECTIONS",
        "TENANT_DB_MIN_CONNECTIONS",
    ];

    #[test]
    fn test_defaults_match_env_defaults() {
        let unset: Vec<(&str, Option<&str>)> = KEYS.iter().map(|k| (*k, None)).collect();
        temp_env::with_vars(unset, || {
            assert_eq!(BiometricConfig::from_env().unwrap(), BiometricConfig::default());
        });
    }

    #[test]
    fn test_overrides() {
        temp_env::with_vars(
            [
                ("ENCODING_CACHE_TTL", Some("15")),
                ("FACE_MATCH_THRESHOLD", Some("0.4")),
                ("ENGINE_WORKERS", Some("4")),
            ],
            || {
                let config = BiometricConfig::from_env().unwrap();
                assert_eq!(config.encoding_cache_ttl, Duration::from_secs(15));
                assert_eq!(config.match_threshold, 0.4);
                assert_eq!(config.engine_workers, 4);
            },
        );
    }

    #[test]
    fn test_rejects_zero_workers() {
        temp_env::with_var("ENGINE_WORKERS", Some("0"), || {
            let err = BiometricConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("ENGINE_WORKERS"));
        });
    }

    #[test]
    fn test_rejects_garbage_threshold() {
        temp_env::with_var("FACE_MATCH_THRESHOLD", Some("close enough"), || {
            assert!(BiometricConfig::from_env().is_err());
        });
    }
}
