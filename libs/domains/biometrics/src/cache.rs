//! Cache layer
//!
//! A string key/value store with per-key TTL, used cache-aside by the tenant
//! registry and the enrollment store. Values are JSON documents and every
//! write replaces the whole value.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{BiometricResult, bounded};
use crate::models::{TenantId, UserId};

/// Upper bound on a single cache call unless overridden
pub const DEFAULT_CACHE_TIMEOUT: Duration = Duration::from_secs(2);

/// Namespaced cache keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKey {
    /// `tenant:config:{tenant}`
    TenantConfig(TenantId),
    /// `tenant:{tenant}:enrollments`
    Enrollments(TenantId),
    /// `tenant:{tenant}:user:{user}:enrollment`
    UserEnrollment(TenantId, UserId),
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TenantConfig(tenant) => write!(f, "tenant:config:{}", tenant),
            Self::Enrollments(tenant) => write!(f, "tenant:{}:enrollments", tenant),
            Self::UserEnrollment(tenant, user) => {
                write!(f, "tenant:{}:user:{}:enrollment", tenant, user)
            }
        }
    }
}

/// Raw key/value operations of the backing cache
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> BiometricResult<Option<String>>;

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> BiometricResult<()>;

    /// Returns whether a key was removed
    async fn delete(&self, key: &str) -> BiometricResult<bool>;

    /// Remaining lifetime, `None` when the key is absent or has no expiry
    async fn ttl(&self, key: &str) -> BiometricResult<Option<Duration>>;
}

/// Redis-backed cache store
#[derive(Clone)]
pub struct RedisCacheStore {
    redis: ConnectionManager,
}

impl RedisCacheStore {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> BiometricResult<Option<String>> {
        let mut conn = self.redis.clone();
        Ok(conn.get(key).await?)
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> BiometricResult<()> {
        let mut conn = self.redis.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1)).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> BiometricResult<bool> {
        let mut conn = self.redis.clone();
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn ttl(&self, key: &str) -> BiometricResult<Option<Duration>> {
        let mut conn = self.redis.clone();
        // -2 when missing, -1 when persistent
        let secs: i64 = conn.ttl(key).await?;
        Ok((secs > 0).then(|| Duration::from_secs(secs as u64)))
    }
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

/// In-process cache store for single-node deployments and tests
///
/// Expired entries are dropped when read and swept on every write.
#[derive(Debug, Default, Clone)]
pub struct MemoryCacheStore {
    entries: Arc<DashMap<String, MemoryEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn live_entry(&self, key: &str) -> Option<MemoryEntry> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                return Some(entry.clone());
            }
        }
        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        None
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> BiometricResult<Option<String>> {
        Ok(self.live_entry(key).map(|entry| entry.value))
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> BiometricResult<()> {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
        self.entries.insert(
            key.to_string(),
            MemoryEntry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> BiometricResult<bool> {
        let live = self.live_entry(key).is_some();
        self.entries.remove(key);
        Ok(live)
    }

    async fn ttl(&self, key: &str) -> BiometricResult<Option<Duration>> {
        Ok(self
            .live_entry(key)
            .map(|entry| entry.expires_at.saturating_duration_since(Instant::now())))
    }
}

/// Typed JSON access on top of a [`CacheStore`]
///
/// Every store call is bounded by the layer's timeout. Cache-aside reads and
/// writes never fail: a broken or slow cache degrades to a miss. The
/// administrative methods ([`CacheLayer::delete`], [`CacheLayer::exists`],
/// [`CacheLayer::ttl`]) report store errors to the caller.
#[derive(Clone)]
pub struct CacheLayer {
    store: Arc<dyn CacheStore>,
    timeout: Duration,
}

impl CacheLayer {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            timeout: DEFAULT_CACHE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn raw_get(&self, key: &str) -> BiometricResult<Option<String>> {
        bounded("cache", self.timeout, self.store.get(key)).await
    }

    async fn raw_delete(&self, key: &str) -> BiometricResult<bool> {
        bounded("cache", self.timeout, self.store.delete(key)).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let key = key.to_string();
        let raw = match self.raw_get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(%key, "Cache miss");
                return None;
            }
            Err(e) => {
                warn!(%key, error = %e, "Cache read failed, falling back to source");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                debug!(%key, "Cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(%key, error = %e, "Discarding undecodable cache entry");
                None
            }
        }
    }

    pub async fn put_json<T: Serialize + ?Sized>(&self, key: &CacheKey, value: &T, ttl: Duration) {
        let key = key.to_string();
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(%key, error = %e, "Failed to serialize cache entry");
                return;
            }
        };

        if let Err(e) = bounded("cache", self.timeout, self.store.set_ex(&key, raw, ttl)).await {
            warn!(%key, error = %e, "Cache write failed");
        }
    }

    /// Drop a key after a write to the source of truth.
    pub async fn invalidate(&self, key: &CacheKey) {
        let key = key.to_string();
        match self.raw_delete(&key).await {
            Ok(removed) => debug!(%key, removed, "Invalidated cache key"),
            Err(e) => warn!(%key, error = %e, "Cache invalidation failed"),
        }
    }

    pub async fn delete(&self, key: &CacheKey) -> BiometricResult<bool> {
        self.raw_delete(&key.to_string()).await
    }

    pub async fn exists(&self, key: &CacheKey) -> BiometricResult<bool> {
        Ok(self.raw_get(&key.to_string()).await?.is_some())
    }

    pub async fn ttl(&self, key: &CacheKey) -> BiometricResult<Option<Duration>> {
        bounded("cache", self.timeout, self.store.ttl(&key.to_string())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BiometricError;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Probe {
        name: String,
    }

    fn probe() -> Probe {
        Probe {
            name: "gallery".to_string(),
        }
    }

    #[test]
    fn test_key_formats() {
        assert_eq!(CacheKey::TenantConfig(4).to_string(), "tenant:config:4");
        assert_eq!(CacheKey::Enrollments(4).to_string(), "tenant:4:enrollments");
        assert_eq!(
            CacheKey::UserEnrollment(4, 19).to_string(),
            "tenant:4:user:19:enrollment"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_store_expires_entries() {
        let store = MemoryCacheStore::new();
        store
            .set_ex("k", "v".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.ttl("k").await.unwrap(), Some(Duration::from_secs(1)));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.ttl("k").await.unwrap(), None);
        assert!(!store.delete("k").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_store_sweeps_expired_entries_on_write() {
        let store = MemoryCacheStore::new();
        for user in 0..10 {
            let key = CacheKey::UserEnrollment(1, user).to_string();
            store.set_ex(&key, "{}".to_string(), Duration::from_secs(60)).await.unwrap();
        }
        assert_eq!(store.entries.len(), 10);

        tokio::time::advance(Duration::from_secs(61)).await;
        store
            .set_ex("tenant:1:enrollments", "[]".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(store.entries.len(), 1);
        assert!(store.entries.contains_key("tenant:1:enrollments"));
    }

    #[tokio::test]
    async fn test_memory_store_delete_reports_removal() {
        let store = MemoryCacheStore::new();
        store
            .set_ex("k", "v".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_layer_round_trips_json() {
        let cache = CacheLayer::new(Arc::new(MemoryCacheStore::new()));
        let key = CacheKey::Enrollments(1);

        assert_eq!(cache.get_json::<Probe>(&key).await, None);
        cache.put_json(&key, &probe(), Duration::from_secs(60)).await;
        assert_eq!(cache.get_json::<Probe>(&key).await, Some(probe()));
        assert!(cache.exists(&key).await.unwrap());
        assert!(cache.delete(&key).await.unwrap());
        assert!(!cache.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_layer_treats_read_failure_as_miss() {
        let mut store = MockCacheStore::new();
        store
            .expect_get()
            .returning(|_| Err(BiometricError::Internal("connection reset".into())));
        store
            .expect_set_ex()
            .returning(|_, _, _| Err(BiometricError::Internal("connection reset".into())));

        let cache = CacheLayer::new(Arc::new(store));
        let key = CacheKey::TenantConfig(1);

        assert_eq!(cache.get_json::<Probe>(&key).await, None);
        // write failures are swallowed
        cache.put_json(&key, &probe(), Duration::from_secs(60)).await;
        // admin paths surface them
        assert!(cache.exists(&key).await.is_err());
    }

    #[tokio::test]
    async fn test_layer_discards_undecodable_entry() {
        let mut store = MockCacheStore::new();
        store
            .expect_get()
            .withf(|key| key.to_string() == "tenant:9:enrollments")
            .returning(|_| Ok(Some("{not json".to_string())));

        let cache = CacheLayer::new(Arc::new(store));
        assert_eq!(cache.get_json::<Probe>(&CacheKey::Enrollments(9)).await, None);
    }

    struct StalledStore;

    #[async_trait]
    impl CacheStore for StalledStore {
        async fn get(&self, _key: &str) -> BiometricResult<Option<String>> {
            std::future::pending().await
        }

        async fn set_ex(&self, _key: &str, _value: String, _ttl: Duration) -> BiometricResult<()> {
            std::future::pending().await
        }

        async fn delete(&self, _key: &str) -> BiometricResult<bool> {
            std::future::pending().await
        }

        async fn ttl(&self, _key: &str) -> BiometricResult<Option<Duration>> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_store_is_bounded() {
        let cache = CacheLayer::new(Arc::new(StalledStore)).with_timeout(Duration::from_secs(1));
        let key = CacheKey::Enrollments(3);

        assert_eq!(cache.get_json::<Probe>(&key).await, None);
        cache.put_json(&key, &probe(), Duration::from_secs(60)).await;
        cache.invalidate(&key).await;

        assert!(matches!(
            cache.exists(&key).await,
            Err(BiometricError::Timeout { operation: "cache", seconds: 1 })
        ));
        assert!(matches!(cache.delete(&key).await, Err(BiometricError::Timeout { .. })));
        assert!(matches!(cache.ttl(&key).await, Err(BiometricError::Timeout { .. })));
    }
}
