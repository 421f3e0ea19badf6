use sea_orm::{ConnectionTrait, DatabaseConnection, Statement};
use tracing::debug;

use crate::common::health::{bounded_probe, measure};
use crate::common::{DatabaseError, HealthStatus};

/// Run `SELECT 1` on a pool, gateway or tenant alike
pub async fn check_health(db: &DatabaseConnection) -> Result<(), DatabaseError> {
    bounded_probe("mysql", async {
        let stmt = Statement::from_string(db.get_database_backend(), "SELECT 1".to_owned());
        db.query_one_raw(stmt)
            .await
            .map_err(|e| DatabaseError::unhealthy("mysql", e))?
            .ok_or_else(|| DatabaseError::unhealthy("mysql", "SELECT 1 returned no row"))?;

        debug!("MySQL answered SELECT 1");
        Ok(())
    })
    .await
}

pub async fn check_health_detailed(db: &DatabaseConnection) -> HealthStatus {
    measure(check_health(db)).await
}
