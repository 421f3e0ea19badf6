//! MySQL and Redis plumbing for the facegate services
//!
//! Two kinds of backends are involved: MySQL servers (the tenant gateway and
//! each tenant's own database) and one shared Redis cache. This crate owns
//! their configuration, connection with retry, and health probes; it knows
//! nothing about tenants or enrollments.
//!
//! # Features
//!
//! - `mysql` (default): SeaORM pools, `SELECT 1` probes
//! - `redis` (default): `ConnectionManager`, `PING` probes
//! - `config`: `core_config::FromEnv` for [`mysql::MySqlConfig`] and [`redis::RedisConfig`]
//!
//! # Example
//!
//! ```ignore
//! use database::{mysql, redis};
//!
//! let gateway = mysql::connect_from_config_with_retry(mysql::MySqlConfig::from_env()?, None).await?;
//! let mut cache = redis::connect_from_config_with_retry(redis::RedisConfig::from_env()?, None).await?;
//!
//! mysql::check_health(&gateway).await?;
//! redis::check_health(&mut cache).await?;
//! ```

pub mod common;

#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(feature = "redis")]
pub mod redis;

pub use common::{DatabaseError, DatabaseResult};
