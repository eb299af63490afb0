//! Confidential Deploy - Entry point.

use anyhow::{Context, Result};
use confidential_deploy::{
    api::{create_router, AppState},
    config::Config,
    store::Sealer,
    DataStore, Orchestrator,
};
use secrecy::ExposeSecret;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&config);

    if let Err(e) = run(config).await {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.log.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run(config: Config) -> Result<()> {
    info!("Starting Confidential Deploy");

    // Initialize storage
    let store = if config.storage.persist {
        let sealer = config
            .storage
            .sealing_key
            .as_ref()
            .map(|key| Sealer::from_secret(key.expose_secret()));
        if sealer.is_none() {
            warn!("No sealing key configured, records are stored unencrypted");
        }
        DataStore::open(&config.storage.data_dir, sealer)
            .await
            .context("Failed to open storage")?
    } else {
        info!("Persistence disabled, using in-memory storage");
        DataStore::memory()
    };

    let orchestrator = Orchestrator::from_config(&config, store);
    let app = create_router(AppState::new(orchestrator));

    // Bind to address
    let addr = SocketAddr::new(
        config
            .server
            .listen_addr
            .parse()
            .unwrap_or([0, 0, 0, 0].into()),
        config.server.port,
    );

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(%addr, coordinator = %config.coordinator_settings().base_url(), "Listening");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
