//! Facegate Admin
//!
//! Operator CLI for the biometric core. Inspects and invalidates the shared
//! Redis cache entries of a tenant and checks the gateway database and Redis.
//!
//! Pools are per process, so `status` only reports a live pool when
//! `--probe` opened one in this run.

use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use core_config::Environment;
use core_config::tracing::{init_tracing, install_color_eyre};
use database::common::HealthStatus;
use domain_biometrics::{
    CacheAdmin, CacheLayer, ConnectionPoolManager, EnrollmentStore, MySqlTenantConnector, RedisCacheStore,
    SqlEnrollmentRepository, SqlTenantSource, TenantId, TenantRegistry, UserId,
};
use eyre::{Result, eyre};
use tracing::info;

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "facegate-admin")]
#[command(about = "Inspect and invalidate facegate tenant caches")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show cache keys, their TTLs and pool state for a tenant
    Status {
        #[arg(short, long)]
        tenant: TenantId,

        /// Also report the per-user enrollment key
        #[arg(short, long)]
        user: Option<UserId>,

        /// Open the tenant pool and ping the tenant database first
        #[arg(long)]
        probe: bool,
    },

    /// Drop cached data for a tenant
    Invalidate {
        #[arg(short, long)]
        tenant: TenantId,

        #[arg(short, long, value_enum, default_value_t = Scope::All)]
        scope: Scope,
    },

    /// Check the gateway database and Redis
    Health,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Scope {
    /// `tenant:{id}:enrollments`
    Enrollments,
    /// `tenant:config:{id}` and the tenant pool
    Config,
    All,
}

fn print_health(name: &str, status: &HealthStatus) {
    match &status.message {
        None => println!("{:<10} ok ({} ms)", name, status.response_time_ms),
        Some(message) => println!("{:<10} FAILED ({} ms): {}", name, status.response_time_ms, message),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    install_color_eyre();

    let config = Config::from_env()?;
    let environment = Environment::from_env();
    init_tracing(&environment);

    let cli = Cli::parse();

    info!("Connecting to gateway database...");
    let gateway = database::mysql::connect_from_config_with_retry(config.gateway.clone(), None)
        .await
        .map_err(|e| eyre!("Gateway database connection failed: {}", e))?;

    info!("Connecting to Redis...");
    let mut redis = database::redis::connect_from_config_with_retry(config.redis.clone(), None)
        .await
        .map_err(|e| eyre!("Redis connection failed: {}", e))?;

    if let Commands::Health = cli.command {
        let gateway_status = database::mysql::check_health_detailed(&gateway).await;
        let redis_status = database::redis::check_health_detailed(&mut redis).await;

        print_health("gateway", &gateway_status);
        print_health("redis", &redis_status);

        if !(gateway_status.healthy && redis_status.healthy) {
            return Err(eyre!("One or more backends are unhealthy"));
        }
        return Ok(());
    }

    let settings = &config.biometrics;
    let cache = CacheLayer::new(Arc::new(RedisCacheStore::new(redis))).with_timeout(settings.store_timeout);
    let registry = TenantRegistry::new(
        Arc::new(SqlTenantSource::new(gateway)),
        cache.clone(),
        settings.tenant_cache_ttl,
        settings.store_timeout,
    );
    let pools = ConnectionPoolManager::new(
        registry,
        Arc::new(MySqlTenantConnector::new(
            settings.tenant_max_connections,
            settings.tenant_min_connections,
        )),
    );
    let enrollments = EnrollmentStore::new(
        Arc::new(SqlEnrollmentRepository::new(pools.clone())),
        cache.clone(),
        settings.encoding_cache_ttl,
        settings.store_timeout,
    );
    let admin = CacheAdmin::new(cache, pools.clone(), enrollments);

    match cli.command {
        Commands::Status { tenant, user, probe } => {
            if probe {
                let pool = pools.get_pool(tenant).await?;
                database::mysql::check_health(&pool).await?;
                info!(tenant_id = tenant, "Tenant database reachable");
            }

            let status = admin.cache_status(tenant, user).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }

        Commands::Invalidate { tenant, scope } => {
            let report = match scope {
                Scope::Enrollments => admin.invalidate_enrollment_cache(tenant).await?,
                Scope::Config => admin.invalidate_tenant_config_cache(tenant).await?,
                Scope::All => admin.invalidate_all(tenant).await?,
            };
            info!(tenant_id = tenant, ?scope, "Invalidation complete");
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Health => {}
    }

    pools.close_all().await;
    Ok(())
}
