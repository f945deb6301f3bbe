mod api;
mod cache;
mod config;
mod decode;
mod error;
mod occupancy;
mod pagination;
mod poller;
mod resolver;
mod snmp;
mod usecase;

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use crate::cache::backend::{CacheBackend, MemoryBackend, RedisBackend};
use crate::cache::ReadThroughCache;
use crate::config::{CacheBackendKind, CacheConfig, Config};
use crate::poller::Poller;
use crate::resolver::Resolver;
use crate::snmp::client::UdpSnmpClient;
use crate::usecase::{OnuService, ServiceOptions};

/// Redis if configured and reachable, otherwise the in-process map
async fn cache_backend(config: &CacheConfig) -> Arc<dyn CacheBackend> {
    match config.backend {
        CacheBackendKind::Memory => {
            tracing::info!("Using in-memory cache");
            Arc::new(MemoryBackend::new())
        }
        CacheBackendKind::Redis => match RedisBackend::connect(&config.redis).await {
            Ok(backend) => {
                tracing::info!("Using Redis cache at {}:{}", config.redis.host, config.redis.port);
                Arc::new(backend)
            }
            Err(e) => {
                tracing::warn!("Redis unavailable ({}), falling back to in-memory cache", e);
                Arc::new(MemoryBackend::new())
            }
        },
    }
}

/// How long in-flight requests get to finish after a shutdown signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Resolves on ctrl-c, or on SIGTERM where the platform has it
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .context("Failed to listen for SIGTERM")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("Failed to listen for ctrl-c")?,
            _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("olt_snmpd=info,tower_http=info"))
        )
        .init();

    tracing::info!("Starting olt-snmpd");

    // Load config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/olt-snmpd/olt-snmpd.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    tracing::info!("Loaded config from {}", config_path);

    let resolver = Resolver::from_config(&config.olt)
        .context("Failed to build the port address table")?;

    let client = UdpSnmpClient::connect(&config.snmp)
        .await
        .with_context(|| format!("Failed to open SNMP client for {}:{}", config.snmp.host, config.snmp.port))?;

    let cache = ReadThroughCache::new(
        cache_backend(&config.cache).await,
        config.cache.key_prefix.clone(),
        config.cache.timeout(),
    );

    let service = OnuService::new(
        resolver,
        Poller::new(Arc::new(client)),
        cache,
        ServiceOptions::from_config(&config),
    );

    let app = api::routes::router(api::routes::AppState {
        service: Arc::new(service),
    });

    // Bind HTTP server
    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("API listening on {}", config.api.listen);

    // Run server with graceful shutdown
    let cancel = CancellationToken::new();
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    shutdown_signal().await?;

    tracing::info!("Shutdown signal received");
    cancel.cancel();

    match tokio::time::timeout(SHUTDOWN_GRACE, server_handle).await {
        Ok(Err(e)) => tracing::error!("Server task failed: {}", e),
        Err(_) => tracing::warn!("In-flight requests did not finish within {:?}", SHUTDOWN_GRACE),
        Ok(Ok(())) => {}
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
