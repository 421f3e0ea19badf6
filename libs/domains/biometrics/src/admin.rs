//! Cache administration
//!
//! Invalidation and inspection of the cached tenant configuration and
//! galleries, plus teardown of the tenant's connection pool when its
//! configuration is dropped.

use std::time::Duration;

use serde::Serialize;
use tracing::info;

use crate::cache::{CacheKey, CacheLayer};
use crate::enrollment::EnrollmentStore;
use crate::error::BiometricResult;
use crate::models::{TenantId, UserId};
use crate::pool::ConnectionPoolManager;

/// What an invalidation actually removed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InvalidationReport {
    pub tenant_id: TenantId,
    pub config_cleared: bool,
    pub enrollments_cleared: bool,
    pub pool_closed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyStatus {
    pub key: String,
    pub exists: bool,
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStatus {
    pub tenant_id: TenantId,
    pub config: KeyStatus,
    pub enrollments: KeyStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_enrollment: Option<KeyStatus>,
    pub pool_live: bool,
}

#[derive(Clone)]
pub struct CacheAdmin {
    cache: CacheLayer,
    pools: ConnectionPoolManager,
    enrollments: EnrollmentStore,
}

impl CacheAdmin {
    pub fn new(cache: CacheLayer, pools: ConnectionPoolManager, enrollments: EnrollmentStore) -> Self {
        Self {
            cache,
            pools,
            enrollments,
        }
    }

    pub async fn invalidate_enrollment_cache(&self, tenant_id: TenantId) -> BiometricResult<InvalidationReport> {
        let enrollments_cleared = self.enrollments.invalidate_list(tenant_id).await?;
        info!(tenant_id, enrollments_cleared, "Invalidated enrollment cache");

        Ok(InvalidationReport {
            tenant_id,
            enrollments_cleared,
            ..Default::default()
        })
    }

    /// Drop the cached tenant configuration and close the tenant's pool
    ///
    /// The pool is closed even when the cache delete fails; the cache error is
    /// returned afterwards.
    pub async fn invalidate_tenant_config_cache(&self, tenant_id: TenantId) -> BiometricResult<InvalidationReport> {
        let config_cleared = self.pools.registry().invalidate(tenant_id).await;
        let pool_closed = self.pools.invalidate(tenant_id).await;
        let config_cleared = config_cleared?;

        Ok(InvalidationReport {
            tenant_id,
            config_cleared,
            pool_closed,
            ..Default::default()
        })
    }

    /// Per-user keys are not enumerated; they expire on their own TTL.
    pub async fn invalidate_all(&self, tenant_id: TenantId) -> BiometricResult<InvalidationReport> {
        let config = self.invalidate_tenant_config_cache(tenant_id).await?;
        let enrollments = self.invalidate_enrollment_cache(tenant_id).await?;

        Ok(InvalidationReport {
            tenant_id,
            config_cleared: config.config_cleared,
            enrollments_cleared: enrollments.enrollments_cleared,
            pool_closed: config.pool_closed,
        })
    }

    async fn key_status(&self, key: CacheKey) -> BiometricResult<KeyStatus> {
        let exists = self.cache.exists(&key).await?;
        let ttl = if exists { self.cache.ttl(&key).await? } else { None };

        Ok(KeyStatus {
            key: key.to_string(),
            exists,
            ttl_secs: ttl.as_ref().map(Duration::as_secs),
        })
    }

    pub async fn cache_status(&self, tenant_id: TenantId, user_id: Option<UserId>) -> BiometricResult<CacheStatus> {
        let user_enrollment = match user_id {
            Some(user_id) => Some(self.key_status(CacheKey::UserEnrollment(tenant_id, user_id)).await?),
            None => None,
        };

        Ok(CacheStatus {
            tenant_id,
            config: self.key_status(CacheKey::TenantConfig(tenant_id)).await?,
            enrollments: self.key_status(CacheKey::Enrollments(tenant_id)).await?,
            user_enrollment,
            pool_live: self.pools.is_live(tenant_id).await,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryCacheStore, MockCacheStore};
    use crate::enrollment::{EnrollmentRepository, InMemoryEnrollmentRepository};
    use crate::error::BiometricError;
    use crate::pool::MockTenantConnector;
    use crate::tenant::tests::tenant;
    use crate::tenant::{MockTenantSource, TenantRegistry};
    use sea_orm::{DatabaseBackend, MockDatabase};
    use std::sync::Arc;

    struct Fixture {
        admin: CacheAdmin,
        pools: ConnectionPoolManager,
        enrollments: EnrollmentStore,
        repository: InMemoryEnrollmentRepository,
    }

    fn fixture_with(cache: CacheLayer) -> Fixture {
        let mut source = MockTenantSource::new();
        source.expect_fetch_active().returning(|id| Ok(Some(tenant(id))));

        let mut connector = MockTenantConnector::new();
        connector
            .expect_connect()
            .returning(|_| Ok(MockDatabase::new(DatabaseBackend::MySql).into_connection()));

        let registry = TenantRegistry::new(
            Arc::new(source),
            cache.clone(),
            Duration::from_secs(300),
            Duration::from_secs(5),
        );
        let pools = ConnectionPoolManager::new(registry, Arc::new(connector));

        let repository = InMemoryEnrollmentRepository::new();
        let enrollments = EnrollmentStore::new(
            Arc::new(repository.clone()),
            cache.clone(),
            Duration::from_secs(60),
            Duration::from_secs(5),
        );

        Fixture {
            admin: CacheAdmin::new(cache, pools.clone(), enrollments.clone()),
            pools,
            enrollments,
            repository,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(CacheLayer::new(Arc::new(MemoryCacheStore::new())))
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reports_keys_and_pool() {
        let f = fixture();
        f.repository.replace_for_user(4, 7, "Alice", &[1.0]).await.unwrap();

        let status = f.admin.cache_status(4, Some(7)).await.unwrap();
        assert!(!status.config.exists);
        assert!(!status.enrollments.exists);
        assert!(!status.pool_live);

        f.pools.get_pool(4).await.unwrap();
        f.enrollments.list(4).await.unwrap();
        f.enrollments.find_by_user(4, 7).await.unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;

        let status = f.admin.cache_status(4, Some(7)).await.unwrap();
        assert_eq!(status.config.key, "tenant:config:4");
        assert!(status.config.exists);
        assert_eq!(status.config.ttl_secs, Some(290));
        assert!(status.enrollments.exists);
        assert_eq!(status.enrollments.ttl_secs, Some(50));
        let user = status.user_enrollment.unwrap();
        assert_eq!(user.key, "tenant:4:user:7:enrollment");
        assert!(user.exists);
        assert!(status.pool_live);
    }

    #[tokio::test]
    async fn test_config_invalidation_tears_down_pool() {
        let f = fixture();
        f.pools.get_pool(4).await.unwrap();

        let report = f.admin.invalidate_tenant_config_cache(4).await.unwrap();
        assert!(report.config_cleared);
        assert!(report.pool_closed);
        assert!(!report.enrollments_cleared);
        assert!(!f.pools.is_live(4).await);

        let again = f.admin.invalidate_tenant_config_cache(4).await.unwrap();
        assert!(!again.config_cleared);
        assert!(!again.pool_closed);
    }

    #[tokio::test]
    async fn test_invalidate_all_leaves_user_keys() {
        let f = fixture();
        f.repository.replace_for_user(4, 7, "Alice", &[1.0]).await.unwrap();
        f.pools.get_pool(4).await.unwrap();
        f.enrollments.list(4).await.unwrap();
        f.enrollments.find_by_user(4, 7).await.unwrap();

        let report = f.admin.invalidate_all(4).await.unwrap();
        assert_eq!(
            report,
            InvalidationReport {
                tenant_id: 4,
                config_cleared: true,
                enrollments_cleared: true,
                pool_closed: true,
            }
        );

        let status = f.admin.cache_status(4, Some(7)).await.unwrap();
        assert!(!status.config.exists);
        assert!(!status.enrollments.exists);
        assert!(status.user_enrollment.unwrap().exists);
    }

    #[tokio::test]
    async fn test_enrollment_invalidation_forces_reload() {
        let f = fixture();
        f.repository.replace_for_user(4, 7, "Alice", &[1.0]).await.unwrap();
        assert_eq!(f.enrollments.list(4).await.unwrap().len(), 1);

        f.repository.replace_for_user(4, 8, "Bob", &[1.0]).await.unwrap();
        assert_eq!(f.enrollments.list(4).await.unwrap().len(), 1);

        let report = f.admin.invalidate_enrollment_cache(4).await.unwrap();
        assert!(report.enrollments_cleared);
        assert_eq!(f.enrollments.list(4).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_store_errors_surface() {
        let mut store = MockCacheStore::new();
        store
            .expect_get()
            .returning(|_| Err(BiometricError::Internal("cache down".into())));
        store
            .expect_delete()
            .returning(|_| Err(BiometricError::Internal("cache down".into())));

        let f = fixture_with(CacheLayer::new(Arc::new(store)));
        assert!(f.admin.cache_status(4, None).await.is_err());
        assert!(f.admin.invalidate_enrollment_cache(4).await.is_err());
    }

    #[tokio::test]
    async fn test_pool_is_closed_when_config_delete_fails() {
        let mut store = MockCacheStore::new();
        store.expect_get().returning(|_| Ok(None));
        store.expect_set_ex().returning(|_, _, _| Ok(()));
        store
            .expect_delete()
            .returning(|_| Err(BiometricError::Internal("cache down".into())));

        let f = fixture_with(CacheLayer::new(Arc::new(store)));
        f.pools.get_pool(4).await.unwrap();

        assert!(f.admin.invalidate_tenant_config_cache(4).await.is_err());
        assert!(!f.pools.is_live(4).await);
    }
}
