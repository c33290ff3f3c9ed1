use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{serve, Extension};
use dotenvy::dotenv;
use tokio::signal;
use tracing::{info, warn};

use dental_analytics_engine::analytics::{self, state::AnalyticsState, store::mongo::MongoStoreAdapter};
use dental_analytics_engine::infrastructure::analytics_config::AnalyticsConfig;
use dental_analytics_engine::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    telemetry::init();

    let config = Arc::new(AnalyticsConfig::from_env()?);
    let store = MongoStoreAdapter::connect(&config.mongo_uri).await?;
    let state = Arc::new(AnalyticsState::new(Arc::clone(&config), Arc::new(store)));

    let router = analytics::router().layer(Extension(Arc::clone(&state)));

    let addr: SocketAddr = config.bind_address().parse()?;
    info!(%addr, "starting dental analytics engine");

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let _cache_sweeper = spawn_cache_sweeper(Arc::clone(&state));

    let server = serve(listener, router.into_make_service());

    tokio::select! {
        res = server => {
            if let Err(err) = res {
                warn!(error = ?err, "server exited with error");
            }
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received, draining in-flight requests");
        }
    }

    Ok(())
}

/// Replaces the legacy digest worker: periodically drops expired cache
/// entries so long-lived deployments don't carry dead weight between
/// requests. Correctness never depends on this running — a lookup against
/// an expired-but-not-yet-swept entry still misses.
fn spawn_cache_sweeper(state: Arc<AnalyticsState>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(300)).await;
            state.cache.sweep_expired(chrono::Utc::now());
            info!(entries = state.cache.len(), "cache sweep complete");
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
