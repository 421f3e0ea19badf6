//! Pieces shared by the MySQL and Redis modules

pub mod error;
pub mod health;
pub mod retry;

pub use error::{DatabaseError, DatabaseResult};
pub use health::{HEALTH_CHECK_TIMEOUT, HealthStatus};
pub use retry::{RetryConfig, retry, retry_with_backoff};
