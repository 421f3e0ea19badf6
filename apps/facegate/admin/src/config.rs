//! Configuration for the admin CLI

use core_config::FromEnv;
use database::mysql::MySqlConfig;
use database::redis::RedisConfig;
use domain_biometrics::BiometricConfig;
use eyre::Result;

#[derive(Debug, Clone)]
pub struct Config {
    /// Gateway database holding the `tenants` table
    pub gateway: MySqlConfig,
    pub redis: RedisConfig,
    pub biometrics: BiometricConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            gateway: <MySqlConfig as FromEnv>::from_env()?,
            redis: <RedisConfig as FromEnv>::from_env()?,
            biometrics: <BiometricConfig as FromEnv>::from_env()?,
        })
    }
}
