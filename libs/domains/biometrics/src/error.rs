use std::future::Future;
use std::time::Duration;

use core_config::ConfigError;
use database::DatabaseError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BiometricError {
    /// Unknown or inactive tenant, empty gallery, missing enrollment
    #[error("Not found: {0}")]
    NotFound(String),

    /// Embedding dimension mismatch between candidate and stored vectors
    #[error("Incompatible embedding: {0}")]
    Incompatible(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The engine found no face in the image
    #[error("Face detection failed: {0}")]
    DetectionFailure(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: &'static str, seconds: u64 },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl BiometricError {
    pub fn tenant_not_found(tenant_id: i64) -> Self {
        Self::NotFound(format!("tenant {} not found", tenant_id))
    }

    /// Whether the caller (rather than the system) is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::Incompatible(_) | Self::InvalidInput(_) | Self::DetectionFailure(_)
        )
    }
}

impl From<DatabaseError> for BiometricError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::MySql(e) => Self::Database(e),
            DatabaseError::Redis(e) => Self::Cache(e),
            other => Self::Internal(other.to_string()),
        }
    }
}

pub type BiometricResult<T> = Result<T, BiometricError>;

/// Run `fut` with an upper bound on its duration.
pub(crate) async fn bounded<T, F>(operation: &'static str, limit: Duration, fut: F) -> BiometricResult<T>
where
    F: Future<Output = BiometricResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(BiometricError::Timeout {
            operation,
            seconds: limit.as_secs(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors() {
        assert!(BiometricError::tenant_not_found(3).is_client_error());
        assert!(BiometricError::InvalidInput("label is required".into()).is_client_error());
        assert!(!BiometricError::Internal("engine returned 128 values".into()).is_client_error());
        assert!(
            !BiometricError::Timeout {
                operation: "enrollment store",
                seconds: 5
            }
            .is_client_error()
        );
    }

    #[test]
    fn test_database_error_conversion() {
        let err: BiometricError = DatabaseError::MySql(sea_orm::DbErr::Custom("gone".into())).into();
        assert!(matches!(err, BiometricError::Database(_)));

        let err: BiometricError = DatabaseError::HealthCheckFailed {
            backend: "redis",
            reason: "unexpected reply 'LOADING'".into(),
        }
        .into();
        assert!(matches!(err, BiometricError::Internal(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let result: BiometricResult<()> = bounded("enrollment store", Duration::from_secs(5), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;

        assert!(matches!(
            result,
            Err(BiometricError::Timeout {
                operation: "enrollment store",
                seconds: 5
            })
        ));
    }

    #[tokio::test]
    async fn test_bounded_passes_result_through() {
        let result = bounded("tenant lookup", Duration::from_secs(5), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[test]
    fn test_tenant_not_found_message() {
        assert_eq!(
            BiometricError::tenant_not_found(42).to_string(),
            "Not found: tenant 42 not found"
        );
    }
}
