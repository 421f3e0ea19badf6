//! Biometrics Domain Library
//!
//! Multi-tenant face enrollment, identification and verification. Each tenant
//! has its own MySQL database holding an `enrollment_{tenant_id}` table; tenant
//! connection parameters live in a shared gateway database.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐        ┌─────────────────┐
//! │   FaceService    │        │   CacheAdmin    │
//! └──┬──────┬─────┬──┘        └───┬─────────┬───┘
//!    │      │     │               │         │
//!    │      │  ┌──▼─────────────┐ │  ┌──────▼────────────────┐
//!    │      │  │EmbeddingWorker │ │  │ ConnectionPoolManager │
//!    │      │  │ (FaceEmbedder) │ │  │  (TenantConnector)    │
//!    │      │  └────────────────┘ │  └──────┬────────────────┘
//!    │  ┌───▼─────────────┐       │         │
//!    │  │ EnrollmentStore ◄───────┘  ┌──────▼─────────┐
//!    │  │ (Repository)    │          │ TenantRegistry │
//!    │  └───┬─────────────┘          │ (TenantSource) │
//!    │      │                        └──────┬─────────┘
//!    │  ┌───▼──────────────────────────────▼─┐
//!    │  │ CacheLayer (Redis / in-memory)     │
//!    │  └────────────────────────────────────┘
//!    │
//!    └─► matcher (cosine search), liveness (face size / detection score)
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use domain_biometrics::{
//!     BiometricConfig, CacheLayer, ConnectionPoolManager, EmbedderFactory, EmbeddingWorker,
//!     EnrollmentStore, FaceService, MemoryCacheStore, MySqlTenantConnector,
//!     SqlEnrollmentRepository, SqlTenantSource, TenantRegistry, VerifyOptions,
//! };
//! use sea_orm::DatabaseConnection;
//!
//! # async fn example(gateway: DatabaseConnection, factory: EmbedderFactory, image: Vec<u8>)
//! #     -> Result<(), Box<dyn std::error::Error>> {
//! let config = BiometricConfig::default();
//! let cache = CacheLayer::new(Arc::new(MemoryCacheStore::new())).with_timeout(config.store_timeout);
//!
//! let registry = TenantRegistry::new(
//!     Arc::new(SqlTenantSource::new(gateway)),
//!     cache.clone(),
//!     config.tenant_cache_ttl,
//!     config.store_timeout,
//! );
//! let pools = ConnectionPoolManager::new(
//!     registry.clone(),
//!     Arc::new(MySqlTenantConnector::new(5, 1)),
//! );
//! let enrollments = EnrollmentStore::new(
//!     Arc::new(SqlEnrollmentRepository::new(pools)),
//!     cache,
//!     config.encoding_cache_ttl,
//!     config.store_timeout,
//! );
//! let engine = EmbeddingWorker::new(factory, config.engine_workers, config.engine_timeout);
//!
//! let service = FaceService::new(registry, enrollments, engine, config);
//! let outcome = service.verify(1, 7, &image, VerifyOptions::default()).await?;
//! println!("verified: {}", outcome.verified);
//! # Ok(())
//! # }
//! ```

pub mod admin;
pub mod cache;
pub mod config;
pub mod engine;
pub mod enrollment;
pub mod error;
pub mod liveness;
pub mod matcher;
pub mod models;
pub mod pool;
pub mod service;
pub mod tenant;

pub use admin::{CacheAdmin, CacheStatus, InvalidationReport, KeyStatus};
pub use cache::{CacheKey, CacheLayer, CacheStore, MemoryCacheStore, RedisCacheStore};
pub use config::BiometricConfig;
pub use engine::{DetectedFace, EmbedderFactory, EmbeddingWorker, FaceEmbedder, decode_image};
pub use enrollment::{
    EnrollmentRepository, EnrollmentStore, InMemoryEnrollmentRepository, SqlEnrollmentRepository,
};
pub use error::{BiometricError, BiometricResult};
pub use liveness::{LivenessFailure, LivenessReport, LivenessResult};
pub use models::{
    BoundingBox, CompareOutcome, DeleteOutcome, EMBEDDING_DIM, EncodeOutcome, EnrollOutcome, EnrollmentRecord,
    EnrollmentStatus, EnrollmentSummary, FaceSummary, Gallery, IdentifyOutcome, TenantConfig,
    TenantId, TenantStatus, UserId, VerifyOutcome, VerifyReason,
};
pub use pool::{ConnectionPoolManager, MySqlTenantConnector, TenantConnection, TenantConnector};
pub use service::{FaceService, VerifyOptions};
pub use tenant::{SqlTenantSource, TenantRegistry, TenantSource};

