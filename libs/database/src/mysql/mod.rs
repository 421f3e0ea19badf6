//! MySQL connector and utilities
//!
//! Provides pool configuration, connection management (with retry) and
//! health checks on top of SeaORM.

mod config;
mod connector;
mod health;

pub use config::MySqlConfig;
pub use connector::{connect, connect_from_config, connect_from_config_with_retry, connect_with_options};
pub use health::{check_health, check_health_detailed};

// Re-export SeaORM types for convenience
pub use sea_orm::{ConnectOptions, DatabaseConnection, DbErr};
