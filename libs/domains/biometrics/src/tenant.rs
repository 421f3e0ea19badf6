use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, DbErr, QueryResult, Statement};
use tracing::{debug, info};

use crate::cache::{CacheKey, CacheLayer};
use crate::error::{BiometricError, BiometricResult, bounded};
use crate::models::{TenantConfig, TenantId, TenantStatus};

const ACTIVE_TENANT_SQL: &str = "SELECT id, name, db_host, port, db_name, db_user, db_pass, status \
     FROM tenants WHERE id = ? AND (status = 'active' OR status = 1)";

/// Source of truth for tenant connection parameters
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TenantSource: Send + Sync {
    /// Look up an active tenant; inactive and unknown tenants yield `None`.
    async fn fetch_active(&self, tenant_id: TenantId) -> BiometricResult<Option<TenantConfig>>;
}

/// Reads the gateway database's `tenants` table
#[derive(Clone)]
pub struct SqlTenantSource {
    db: DatabaseConnection,
}

impl SqlTenantSource {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TenantSource for SqlTenantSource {
    async fn fetch_active(&self, tenant_id: TenantId) -> BiometricResult<Option<TenantConfig>> {
        let stmt = Statement::from_sql_and_values(DbBackend::MySql, ACTIVE_TENANT_SQL, [tenant_id.into()]);
        let row = self.db.query_one_raw(stmt).await?;
        row.map(|row| tenant_from_row(&row)).transpose().map_err(Into::into)
    }
}

fn tenant_from_row(row: &QueryResult) -> Result<TenantConfig, DbErr> {
    let port: i64 = row.try_get("", "port")?;
    let port = u16::try_from(port).map_err(|_| DbErr::Custom(format!("invalid tenant port {}", port)))?;

    Ok(TenantConfig {
        id: row.try_get("", "id")?,
        name: row.try_get("", "name")?,
        db_host: row.try_get("", "db_host")?,
        port,
        db_name: row.try_get("", "db_name")?,
        db_user: row.try_get("", "db_user")?,
        db_pass: row.try_get::<Option<String>>("", "db_pass")?.unwrap_or_default(),
        status: status_from_row(row)?,
    })
}

/// The status column is either an enum/varchar or a tinyint flag.
fn status_from_row(row: &QueryResult) -> Result<TenantStatus, DbErr> {
    if let Ok(raw) = row.try_get::<String>("", "status") {
        return raw
            .parse()
            .map_err(|_| DbErr::Custom(format!("unknown tenant status '{}'", raw)));
    }
    let flag: i64 = row.try_get("", "status")?;
    Ok(TenantStatus::from_flag(flag))
}

/// Resolves tenant ids to connection parameters, cache-aside
#[derive(Clone)]
pub struct TenantRegistry {
    source: Arc<dyn TenantSource>,
    cache: CacheLayer,
    ttl: Duration,
    timeout: Duration,
}

impl TenantRegistry {
    pub fn new(source: Arc<dyn TenantSource>, cache: CacheLayer, ttl: Duration, timeout: Duration) -> Self {
        Self {
            source,
            cache,
            ttl,
            timeout,
        }
    }

    /// Get the configuration of an active tenant
    ///
    /// Returns [`BiometricError::NotFound`] for unknown or inactive tenants.
    pub async fn get_config(&self, tenant_id: TenantId) -> BiometricResult<TenantConfig> {
        let key = CacheKey::TenantConfig(tenant_id);
        if let Some(config) = self.cache.get_json::<TenantConfig>(&key).await {
            return Ok(config);
        }

        let config = bounded("tenant lookup", self.timeout, self.source.fetch_active(tenant_id))
            .await?
            .filter(TenantConfig::is_active)
            .ok_or_else(|| BiometricError::tenant_not_found(tenant_id))?;

        debug!(tenant_id, name = %config.name, "Loaded tenant config");
        self.cache.put_json(&key, &config, self.ttl).await;
        Ok(config)
    }

    /// Drop the cached configuration
    ///
    /// Callers must also tear down the tenant's pool so the old parameters
    /// are not reused; [`crate::admin::CacheAdmin`] does both.
    pub async fn invalidate(&self, tenant_id: TenantId) -> BiometricResult<bool> {
        let removed = self.cache.delete(&CacheKey::TenantConfig(tenant_id)).await?;
        info!(tenant_id, removed, "Invalidated tenant config cache");
        Ok(removed)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;
    use mockall::predicate::eq;
    use sea_orm::{MockDatabase, Value};
    use std::collections::BTreeMap;

    pub(crate) fn tenant(id: TenantId) -> TenantConfig {
        TenantConfig {
            id,
            name: format!("School {}", id),
            db_host: "10.1.0.4".to_string(),
            port: 3306,
            db_name: format!("school_{}", id),
            db_user: "facegate".to_string(),
            db_pass: "secret".to_string(),
            status: TenantStatus::Active,
        }
    }

    fn registry(source: MockTenantSource) -> (TenantRegistry, CacheLayer) {
        let cache = CacheLayer::new(Arc::new(MemoryCacheStore::new()));
        let registry = TenantRegistry::new(
            Arc::new(source),
            cache.clone(),
            Duration::from_secs(300),
            Duration::from_secs(5),
        );
        (registry, cache)
    }

    fn gateway_row(status: Value) -> BTreeMap<&'static str, Value> {
        BTreeMap::from([
            ("id", Value::BigInt(Some(3))),
            ("name", Value::from("SMK 3")),
            ("db_host", Value::from("db.internal")),
            ("port", Value::BigInt(Some(3307))),
            ("db_name", Value::from("smk3")),
            ("db_user", Value::from("svc")),
            ("db_pass", Value::from("pw")),
            ("status", status),
        ])
    }

    #[tokio::test]
    async fn test_get_config_caches_after_first_lookup() {
        let mut source = MockTenantSource::new();
        source
            .expect_fetch_active()
            .with(eq(1))
            .times(1)
            .returning(|id| Ok(Some(tenant(id))));

        let (registry, cache) = registry(source);

        assert_eq!(registry.get_config(1).await.unwrap(), tenant(1));
        assert_eq!(registry.get_config(1).await.unwrap(), tenant(1));
        assert!(cache.exists(&CacheKey::TenantConfig(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_tenant_is_not_found_and_not_cached() {
        let mut source = MockTenantSource::new();
        source.expect_fetch_active().times(2).returning(|_| Ok(None));

        let (registry, cache) = registry(source);

        let err = registry.get_config(99).await.unwrap_err();
        assert!(matches!(err, BiometricError::NotFound(_)));
        assert!(!cache.exists(&CacheKey::TenantConfig(99)).await.unwrap());
        assert!(registry.get_config(99).await.is_err());
    }

    #[tokio::test]
    async fn test_inactive_tenant_is_rejected() {
        let mut source = MockTenantSource::new();
        source.expect_fetch_active().returning(|id| {
            Ok(Some(TenantConfig {
                status: TenantStatus::Inactive,
                ..tenant(id)
            }))
        });

        let (registry, _) = registry(source);
        assert!(matches!(
            registry.get_config(5).await,
            Err(BiometricError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let mut source = MockTenantSource::new();
        source
            .expect_fetch_active()
            .times(2)
            .returning(|id| Ok(Some(tenant(id))));

        let (registry, _) = registry(source);

        registry.get_config(2).await.unwrap();
        assert!(registry.invalidate(2).await.unwrap());
        assert!(!registry.invalidate(2).await.unwrap());
        registry.get_config(2).await.unwrap();
    }

    #[tokio::test]
    async fn test_sql_source_decodes_string_status() {
        let db = MockDatabase::new(DbBackend::MySql)
            .append_query_results([vec![gateway_row(Value::from("active"))]])
            .into_connection();

        let config = SqlTenantSource::new(db).fetch_active(3).await.unwrap().unwrap();
        assert_eq!(config.port, 3307);
        assert_eq!(config.db_name, "smk3");
        assert_eq!(config.status, TenantStatus::Active);
    }

    #[tokio::test]
    async fn test_sql_source_decodes_flag_status() {
        let db = MockDatabase::new(DbBackend::MySql)
            .append_query_results([vec![gateway_row(Value::BigInt(Some(1)))]])
            .into_connection();

        let config = SqlTenantSource::new(db).fetch_active(3).await.unwrap().unwrap();
        assert!(config.is_active());
    }

    #[tokio::test]
    async fn test_sql_source_missing_row() {
        let db = MockDatabase::new(DbBackend::MySql)
            .append_query_results([Vec::<BTreeMap<&str, Value>>::new()])
            .into_connection();

        assert!(SqlTenantSource::new(db).fetch_active(3).await.unwrap().is_none());
    }
}
