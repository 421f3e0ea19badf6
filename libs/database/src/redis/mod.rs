//! Redis access for the shared cache
//!
//! Config from the environment, connection with retry, and `PING` health checks.

mod config;
mod connector;
mod health;

pub use config::RedisConfig;
pub use connector::{connect, connect_from_config, connect_from_config_with_retry};
pub use health::{check_health, check_health_detailed};

pub use redis::aio::ConnectionManager;
