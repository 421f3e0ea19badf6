use std::ops::Deref;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use database::mysql::{MySqlConfig, connect_from_config};
use sea_orm::{DatabaseConnection, DatabaseTransaction, DbErr, TransactionTrait};
use tokio::sync::{OwnedRwLockReadGuard, RwLock};
use tracing::{info, warn};

use crate::error::BiometricResult;
use crate::models::{TenantConfig, TenantId};
use crate::tenant::TenantRegistry;

/// Opens a connection pool for a tenant database
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TenantConnector: Send + Sync {
    async fn connect(&self, config: &TenantConfig) -> BiometricResult<DatabaseConnection>;
}

/// Connects to tenant MySQL servers with a fixed pool size
#[derive(Debug, Clone)]
pub struct MySqlTenantConnector {
    max_connections: u32,
    min_connections: u32,
}

impl MySqlTenantConnector {
    pub fn new(max_connections: u32, min_connections: u32) -> Self {
        Self {
            max_connections,
            min_connections,
        }
    }
}

#[async_trait]
impl TenantConnector for MySqlTenantConnector {
    async fn connect(&self, config: &TenantConfig) -> BiometricResult<DatabaseConnection> {
        let options = MySqlConfig::from_parts(
            &config.db_host,
            config.port,
            &config.db_user,
            &config.db_pass,
            &config.db_name,
        )
        .with_pool_size(self.max_connections, self.min_connections);

        Ok(connect_from_config(options).await?)
    }
}

type PoolSlot = Arc<RwLock<Option<DatabaseConnection>>>;
type SlotGuard = OwnedRwLockReadGuard<Option<DatabaseConnection>>;

/// A pooled connection pinned for one unit of work
///
/// Dropping it without [`TenantConnection::commit`] rolls back and returns the
/// connection to the pool. The tenant's pool cannot be torn down while any
/// `TenantConnection` for it is alive.
pub struct TenantConnection {
    txn: DatabaseTransaction,
    _slot: SlotGuard,
}

impl TenantConnection {
    pub async fn commit(self) -> Result<(), DbErr> {
        let Self { txn, _slot } = self;
        txn.commit().await
    }
}

impl Deref for TenantConnection {
    type Target = DatabaseTransaction;

    fn deref(&self) -> &Self::Target {
        &self.txn
    }
}

/// One lazily created pool per tenant
///
/// Each tenant owns a slot guarded by an async `RwLock`. Lookups share the
/// read lock; creation re-checks under the write lock and teardown closes the
/// pool under the same write lock, so a tenant never has two live pools and a
/// pool is never handed out while it is being closed. A slot is removed from
/// the map whenever it is left empty under the write lock, so failed lookups
/// and teardowns leave nothing behind.
#[derive(Clone)]
pub struct ConnectionPoolManager {
    registry: TenantRegistry,
    connector: Arc<dyn TenantConnector>,
    pools: Arc<DashMap<TenantId, PoolSlot>>,
}

impl ConnectionPoolManager {
    pub fn new(registry: TenantRegistry, connector: Arc<dyn TenantConnector>) -> Self {
        Self {
            registry,
            connector,
            pools: Arc::new(DashMap::new()),
        }
    }

    pub fn registry(&self) -> &TenantRegistry {
        &self.registry
    }

    fn slot(&self, tenant_id: TenantId) -> PoolSlot {
        Arc::clone(self.pools.entry(tenant_id).or_default().value())
    }

    fn existing_slot(&self, tenant_id: TenantId) -> Option<PoolSlot> {
        self.pools.get(&tenant_id).map(|slot| Arc::clone(slot.value()))
    }

    fn is_current(&self, tenant_id: TenantId, slot: &PoolSlot) -> bool {
        self.pools
            .get(&tenant_id)
            .is_some_and(|current| Arc::ptr_eq(current.value(), slot))
    }

    /// Drop an empty slot; the caller holds its write lock.
    fn forget(&self, tenant_id: TenantId, slot: &PoolSlot) {
        self.pools.remove_if(&tenant_id, |_, current| Arc::ptr_eq(current, slot));
    }

    /// Get the tenant's pool, creating it on first use
    pub async fn get_pool(&self, tenant_id: TenantId) -> BiometricResult<DatabaseConnection> {
        let (_guard, pool) = self.ensure_pool(tenant_id).await?;
        Ok(pool)
    }

    /// Acquire a connection from the tenant's pool
    pub async fn get_connection(&self, tenant_id: TenantId) -> BiometricResult<TenantConnection> {
        let (guard, pool) = self.ensure_pool(tenant_id).await?;
        let txn = pool.begin().await?;
        Ok(TenantConnection { txn, _slot: guard })
    }

    async fn open(&self, tenant_id: TenantId) -> BiometricResult<DatabaseConnection> {
        let config = self.registry.get_config(tenant_id).await?;
        let pool = self.connector.connect(&config).await?;
        info!(tenant_id, host = %config.db_host, db = %config.db_name, "Created tenant connection pool");
        Ok(pool)
    }

    async fn ensure_pool(&self, tenant_id: TenantId) -> BiometricResult<(SlotGuard, DatabaseConnection)> {
        loop {
            let slot = self.slot(tenant_id);

            {
                let guard = Arc::clone(&slot).read_owned().await;
                if let Some(pool) = guard.as_ref() {
                    let pool = pool.clone();
                    return Ok((guard, pool));
                }
            }

            let mut guard = Arc::clone(&slot).write_owned().await;
            // removed while we waited; an orphaned slot is never filled
            if !self.is_current(tenant_id, &slot) {
                continue;
            }

            let pool = match guard.as_ref() {
                Some(pool) => pool.clone(),
                None => match self.open(tenant_id).await {
                    Ok(pool) => {
                        *guard = Some(pool.clone());
                        pool
                    }
                    Err(e) => {
                        self.forget(tenant_id, &slot);
                        return Err(e);
                    }
                },
            };

            return Ok((guard.downgrade(), pool));
        }
    }

    /// Close the tenant's pool and remove it from the map; the next access
    /// recreates it.
    ///
    /// Returns whether a pool was live.
    pub async fn invalidate(&self, tenant_id: TenantId) -> bool {
        let Some(slot) = self.existing_slot(tenant_id) else {
            return false;
        };

        let mut guard = slot.write().await;
        let pool = guard.take();
        self.forget(tenant_id, &slot);
        drop(guard);

        let Some(pool) = pool else {
            return false;
        };

        if let Err(e) = pool.close().await {
            warn!(tenant_id, error = %e, "Error while closing tenant connection pool");
        }
        info!(tenant_id, "Closed tenant connection pool");
        true
    }

    pub async fn is_live(&self, tenant_id: TenantId) -> bool {
        match self.existing_slot(tenant_id) {
            Some(slot) => slot.read().await.is_some(),
            None => false,
        }
    }

    /// Close every pool, for shutdown
    pub async fn close_all(&self) {
        let tenants: Vec<TenantId> = self.pools.iter().map(|entry| *entry.key()).collect();
        for tenant_id in tenants {
            self.invalidate(tenant_id).await;
        }
    }
}
