use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use tracing::info;

use super::MySqlConfig;
use crate::common::{RetryConfig, retry, retry_with_backoff};

/// Connect to a MySQL database with the default pool settings
///
/// # Example
/// ```ignore
/// let db = database::mysql::connect("mysql://root@localhost:3306/gateway").await?;
/// ```
pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    connect_from_config(MySqlConfig::new(database_url)).await
}

/// Connect using a MySqlConfig
pub async fn connect_from_config(config: MySqlConfig) -> Result<DatabaseConnection, DbErr> {
    connect_with_options(config.into_connect_options()).await
}

/// Connect with custom connection options
pub async fn connect_with_options(options: ConnectOptions) -> Result<DatabaseConnection, DbErr> {
    let db = Database::connect(options).await?;
    info!("Connected to MySQL database");
    Ok(db)
}

/// Connect from config, retrying with exponential backoff on failure
///
/// Useful at process start when the database may come up after the service.
///
/// # Example
/// ```ignore
/// use database::common::RetryConfig;
/// use database::mysql::{MySqlConfig, connect_from_config_with_retry};
///
/// let config = MySqlConfig::from_env()?;
/// let db = connect_from_config_with_retry(config, Some(RetryConfig::new().with_max_retries(5))).await?;
/// ```
pub async fn connect_from_config_with_retry(
    config: MySqlConfig,
    retry_config: Option<RetryConfig>,
) -> Result<DatabaseConnection, DbErr> {
    let options = config.into_connect_options();
    let attempt = || connect_with_options(options.clone());

    match retry_config {
        Some(policy) => retry_with_backoff("mysql", attempt, policy).await,
        None => retry("mysql", attempt).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires actual database
    async fn test_connect() {
        let db_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "mysql://root@127.0.0.1:3306/sekolah_gateway".to_string());

        let result = connect(&db_url).await;
        assert!(result.is_ok());
    }
}
