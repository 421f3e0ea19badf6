use redis::aio::ConnectionManager;
use tracing::debug;

use crate::common::health::{bounded_probe, measure};
use crate::common::{DatabaseError, HealthStatus};

/// `PING` the cache and require `PONG`
pub async fn check_health(conn: &mut ConnectionManager) -> Result<(), DatabaseError> {
    bounded_probe("redis", async {
        let reply: String = redis::cmd("PING")
            .query_async(conn)
            .await
            .map_err(|e| DatabaseError::unhealthy("redis", e))?;

        if reply != "PONG" {
            return Err(DatabaseError::unhealthy("redis", format!("unexpected reply '{}'", reply)));
        }

        debug!("Redis answered PING");
        Ok(())
    })
    .await
}

pub async fn check_health_detailed(conn: &mut ConnectionManager) -> HealthStatus {
    measure(check_health(conn)).await
}
