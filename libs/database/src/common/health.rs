use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use super::DatabaseError;

/// Upper bound on a single probe
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(3);

/// Outcome of one health probe
#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub healthy: bool,

    /// Failure reason when unhealthy
    pub message: Option<String>,

    pub response_time_ms: u64,
}

impl HealthStatus {
    pub fn healthy(response_time_ms: u64) -> Self {
        Self {
            healthy: true,
            message: None,
            response_time_ms,
        }
    }

    pub fn unhealthy(message: String, response_time_ms: u64) -> Self {
        Self {
            healthy: false,
            message: Some(message),
            response_time_ms,
        }
    }
}

/// Run `probe` with [`HEALTH_CHECK_TIMEOUT`]; a probe that hangs is a failure.
pub(crate) async fn bounded_probe<F>(backend: &'static str, probe: F) -> Result<(), DatabaseError>
where
    F: Future<Output = Result<(), DatabaseError>>,
{
    tokio::time::timeout(HEALTH_CHECK_TIMEOUT, probe)
        .await
        .unwrap_or_else(|_| {
            Err(DatabaseError::unhealthy(
                backend,
                format!("no reply within {}s", HEALTH_CHECK_TIMEOUT.as_secs()),
            ))
        })
}

/// Time a probe and fold its result into a [`HealthStatus`].
pub(crate) async fn measure<F>(probe: F) -> HealthStatus
where
    F: Future<Output = Result<(), DatabaseError>>,
{
    let start = Instant::now();
    let outcome = probe.await;
    let elapsed = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(()) => HealthStatus::healthy(elapsed),
        Err(e) => HealthStatus::unhealthy(e.to_string(), elapsed),
    }
}
