use anyhow::Result;
use std::{net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use attempt_guard::{
    config::ServiceConfig,
    http::{router, AppState},
    metrics::Metrics,
    redis::{RedisConfig, RedisStore},
    service::RateLimitService,
    store::{AttemptStore, MemoryStore},
    utils::SystemClock,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "attempt_guard=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting attempt guard");

    let config_path = std::env::var("CONFIG_PATH").ok();
    if let Some(path) = &config_path {
        info!("Loading configuration from: {}", path);
    }
    let config = ServiceConfig::load(config_path.as_deref())?;

    let metrics = Arc::new(Metrics::new()?);
    let store = create_store(&config).await?;
    let service = RateLimitService::from_config(&config, store, Arc::new(SystemClock), metrics)?;
    let state = AppState {
        service: Arc::new(service),
    };

    let http_addr = config.http_addr.parse::<SocketAddr>()?;
    let http_server = start_http_server(state, http_addr);

    info!("HTTP server listening on {}", http_addr);

    tokio::select! {
        result = http_server => {
            if let Err(e) = result {
                warn!("HTTP server error: {}", e);
            }
        }
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    info!("Service stopped");
    Ok(())
}

async fn create_store(config: &ServiceConfig) -> Result<Arc<dyn AttemptStore>> {
    let storage = &config.storage;
    match &storage.redis_url {
        Some(url) => {
            let redis_config = RedisConfig {
                url: url.clone(),
                key_prefix: storage.key_prefix.clone(),
                key_ttl: Some(config.redis_key_ttl()),
                ..Default::default()
            };
            Ok(Arc::new(RedisStore::new(redis_config).await?))
        }
        None => {
            warn!("No Redis URL configured, attempt records are kept in memory");
            Ok(Arc::new(MemoryStore::new(storage.memory_capacity)))
        }
    }
}

async fn start_http_server(state: AppState, addr: SocketAddr) -> Result<()> {
    let app = router(state);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
