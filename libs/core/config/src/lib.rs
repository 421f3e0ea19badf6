//! Environment-driven configuration shared by the facegate crates
//!
//! Every settings struct implements [`FromEnv`] on top of the `env_*` helpers
//! below, so a bad value always surfaces as [`ConfigError::ParseError`] naming
//! the offending variable.

pub mod tracing;

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse environment variable '{key}': {details}")]
    ParseError { key: String, details: String },
}

impl ConfigError {
    pub fn parse(key: &str, details: impl Display) -> Self {
        Self::ParseError {
            key: key.to_string(),
            details: details.to_string(),
        }
    }
}

/// Deployment flavour, selected by `APP_ENV`
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// `APP_ENV=production` (any case) selects production; anything else is development.
    pub fn from_env() -> Self {
        match env::var("APP_ENV") {
            Ok(value) if value.trim().eq_ignore_ascii_case("production") => Environment::Production,
            _ => Environment::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

/// Configuration loadable from environment variables
pub trait FromEnv: Sized {
    fn from_env() -> Result<Self, ConfigError>;
}

pub fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::parse(key, e))
}

/// Read `key` (or `default` when unset) and parse it into `T`.
pub fn env_parse<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    parse_value(key, &env_or_default(key, default))
}

/// Like [`env_parse`] but yields `None` when the variable is unset.
pub fn env_parse_optional<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    env::var(key).ok().map(|raw| parse_value(key, &raw)).transpose()
}

/// A whole number of seconds, e.g. `TENANT_CACHE_TTL=300`
pub fn env_secs(key: &str, default_secs: u64) -> Result<Duration, ConfigError> {
    env_parse(key, &default_secs.to_string()).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_selection() {
        temp_env::with_var_unset("APP_ENV", || {
            assert_eq!(Environment::from_env(), Environment::Development);
        });
        temp_env::with_var("APP_ENV", Some(" Production "), || {
            assert!(Environment::from_env().is_production());
        });
        temp_env::with_var("APP_ENV", Some("staging"), || {
            assert!(!Environment::from_env().is_production());
        });
    }

    #[test]
    fn test_env_parse_uses_default_and_value() {
        temp_env::with_var_unset("FACEGATE_WORKERS", || {
            assert_eq!(env_parse::<usize>("FACEGATE_WORKERS", "2").unwrap(), 2);
        });
        temp_env::with_var("FACEGATE_WORKERS", Some(" 4 "), || {
            assert_eq!(env_parse::<usize>("FACEGATE_WORKERS", "2").unwrap(), 4);
        });
    }

    #[test]
    fn test_env_parse_reports_key_on_failure() {
        temp_env::with_var("FACEGATE_RATIO", Some("wide"), || {
            let err = env_parse::<f64>("FACEGATE_RATIO", "0.15").unwrap_err();
            let ConfigError::ParseError { key, .. } = &err;
            assert_eq!(key, "FACEGATE_RATIO");
            assert!(err.to_string().contains("FACEGATE_RATIO"));
        });
    }

    #[test]
    fn test_env_parse_optional() {
        temp_env::with_var_unset("FACEGATE_DB", || {
            assert_eq!(env_parse_optional::<u8>("FACEGATE_DB").unwrap(), None);
        });
        temp_env::with_var("FACEGATE_DB", Some("3"), || {
            assert_eq!(env_parse_optional::<u8>("FACEGATE_DB").unwrap(), Some(3));
        });
        temp_env::with_var("FACEGATE_DB", Some("x"), || {
            assert!(env_parse_optional::<u8>("FACEGATE_DB").is_err());
        });
    }

    #[test]
    fn test_env_secs() {
        temp_env::with_var_unset("FACEGATE_TTL", || {
            assert_eq!(env_secs("FACEGATE_TTL", 300).unwrap(), Duration::from_secs(300));
        });
        temp_env::with_var("FACEGATE_TTL", Some("45"), || {
            assert_eq!(env_secs("FACEGATE_TTL", 300).unwrap(), Duration::from_secs(45));
        });
        temp_env::with_var("FACEGATE_TTL", Some("-1"), || {
            assert!(env_secs("FACEGATE_TTL", 300).is_err());
        });
    }
}
