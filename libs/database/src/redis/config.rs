#[cfg(feature = "config")]
use core_config::{ConfigError, FromEnv, env_or_default, env_parse, env_parse_optional};

/// Redis connection configuration
///
/// # Example
///
/// ```ignore
/// use database::redis::RedisConfig;
///
/// let config = RedisConfig::from_parts("127.0.0.1", 6379, Some(2), None);
/// let conn = database::redis::connect(config.url()).await?;
/// ```
#[derive(Clone, Debug)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Build a config from host, port, logical database and optional password.
    pub fn from_parts(host: &str, port: u16, database: Option<u8>, password: Option<&str>) -> Self {
        let auth = match password {
            Some(password) if !password.is_empty() => {
                format!(":{}@", urlencoding::encode(password))
            }
            _ => String::new(),
        };
        let db = database.map(|db| format!("/{db}")).unwrap_or_default();
        Self::new(format!("redis://{auth}{host}:{port}{db}"))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// The URL with credentials masked, for logs
    pub fn redacted_url(&self) -> String {
        match (self.url.find("://"), self.url.rfind('@')) {
            (Some(scheme), Some(at)) if at > scheme => {
                format!("{}://***@{}", &self.url[..scheme], &self.url[at + 1..])
            }
            _ => self.url.clone(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self::new("redis://127.0.0.1:6379")
    }
}

/// Load RedisConfig from environment variables
///
/// `REDIS_URL` wins when set. Otherwise the URL is assembled from
/// `REDIS_HOST` (default 127.0.0.1), `REDIS_PORT` (default 6379),
/// `REDIS_DB` (optional) and `REDIS_PASSWORD` (optional).
#[cfg(feature = "config")]
impl FromEnv for RedisConfig {
    fn from_env() -> Result<Self, ConfigError> {
        if let Ok(url) = std::env::var("REDIS_URL") {
            return Ok(Self::new(url));
        }

        let host = env_or_default("REDIS_HOST", "127.0.0.1");
        let port: u16 = env_parse("REDIS_PORT", "6379")?;
        let database: Option<u8> = env_parse_optional("REDIS_DB")?;
        let password = std::env::var("REDIS_PASSWORD").ok();

        Ok(Self::from_parts(&host, port, database, password.as_deref()))
    }
}
