use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use authn::cluster::{PrimaryLocator, SmapLocator};
use authn::sync::{self, ProxySyncer, SyncJob};
use authn::{api, config::Config, manager::UserManager, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    match log_format.to_lowercase().as_str() {
        "gcp" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_stackdriver::layer())
                .init();
        }
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_span_list(false),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    info!(version = env!("CARGO_PKG_VERSION"), "authn starting");

    let config = Config::load()?;
    info!(data_dir = %config.node.data_dir, "Loaded configuration");

    // Shared HTTP client for calls into the cluster
    let http_client = reqwest::Client::builder()
        .pool_idle_timeout(Duration::from_secs(30))
        .pool_max_idle_per_host(2)
        .timeout(Duration::from_secs(config.proxy.http_timeout_seconds))
        .build()?;

    let (sync_handle, sync_queue) = sync::channel(config.proxy.sync_queue_capacity);
    let manager = Arc::new(UserManager::open(&config, sync_handle.clone())?);
    info!(version = manager.version(), "User and token state loaded");

    let locator: Arc<dyn PrimaryLocator> = Arc::new(SmapLocator::new(
        http_client.clone(),
        config.proxy.url.clone(),
        config.proxy.cluster_nodes.clone(),
        config.smap_path(),
    ));
    let syncer = ProxySyncer::new(
        http_client,
        locator,
        Duration::from_secs(config.proxy.retry_ceiling_seconds),
        Duration::from_millis(config.proxy.retry_delay_ms),
    );
    let sync_worker = sync::start_sync_worker(Arc::clone(&manager), syncer, sync_queue);

    // Bring the primary up to date with whatever survived the restart
    sync_handle.schedule(SyncJob::Tokens);
    sync_handle.schedule(SyncJob::Credentials);

    let state = Arc::new(AppState { manager });

    let app = api::create_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(&config.node.bind_address).await?;
    info!("Listening on: {}", config.node.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down background tasks");
    sync_worker.abort();

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
