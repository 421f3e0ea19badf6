use redis::aio::ConnectionManager;
use redis::{Client, RedisResult};
use tracing::info;

use super::RedisConfig;
use crate::common::{RetryConfig, retry, retry_with_backoff};

/// Open a [`ConnectionManager`] and make sure the server answers `PING`.
///
/// The manager reconnects by itself after transient failures; clone it into
/// every component that needs the cache.
pub async fn connect(url: &str) -> RedisResult<ConnectionManager> {
    let manager = ConnectionManager::new(Client::open(url)?).await?;
    redis::cmd("PING").query_async::<String>(&mut manager.clone()).await?;
    Ok(manager)
}

pub async fn connect_from_config(config: RedisConfig) -> RedisResult<ConnectionManager> {
    let manager = connect(config.url()).await?;
    info!(url = %config.redacted_url(), "Connected to Redis");
    Ok(manager)
}

/// [`connect_from_config`] with exponential backoff; `None` uses the default policy.
///
/// ```ignore
/// let redis = connect_from_config_with_retry(RedisConfig::from_env()?, None).await?;
/// ```
pub async fn connect_from_config_with_retry(
    config: RedisConfig,
    retry_config: Option<RetryConfig>,
) -> RedisResult<ConnectionManager> {
    let attempt = || connect_from_config(config.clone());

    match retry_config {
        Some(policy) => retry_with_backoff("redis", attempt, policy).await,
        None => retry("redis", attempt).await,
    }
}
