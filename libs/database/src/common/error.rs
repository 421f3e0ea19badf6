/// Errors from opening, using or probing a MySQL or Redis backend
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[cfg(feature = "mysql")]
    #[error("MySQL error: {0}")]
    MySql(#[from] sea_orm::DbErr),

    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The probe failed, timed out or got an unexpected reply
    #[error("{backend} health check failed: {reason}")]
    HealthCheckFailed { backend: &'static str, reason: String },
}

impl DatabaseError {
    pub(crate) fn unhealthy(backend: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::HealthCheckFailed {
            backend,
            reason: reason.to_string(),
        }
    }
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;
