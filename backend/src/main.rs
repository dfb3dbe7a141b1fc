//! OMS Backend Server
//!
//! Serves login, logout, token refresh and token verification for the
//! order-management platform.

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

use oms_server::auth::{JwtSigner, SessionService, SessionSettings, TokenAuthority};
use oms_server::cache::{CredentialCache, RedisStore};
use oms_server::config::Config;
use oms_server::db::{self, PgUserStore};
use oms_server::routes;
use oms_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration (also reads .env)
    let config = Config::from_env().context("Failed to load configuration")?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!(environment = config.environment.as_str(), "Starting OMS server");

    // Initialize database connection pool
    let db_pool = db::create_pool(&config).await?;
    db::run_migrations(&db_pool).await?;

    // Connect to the credential cache
    tracing::info!("Connecting to Redis at {}", config.redis_url_masked());
    let redis = RedisStore::connect(&config.redis_url)
        .await
        .context("Failed to connect to Redis")?;
    let cache = CredentialCache::new(Arc::new(redis), config.cache.timeout);

    // Wire the auth core
    let signer = Arc::new(JwtSigner::from_config(&config.jwt));
    let tokens = TokenAuthority::new(signer, cache.clone(), &config.jwt, &config.cache);
    let users = Arc::new(PgUserStore::new(db_pool.clone()));
    let session_service = SessionService::new(
        tokens,
        users,
        cache.clone(),
        SessionSettings::from_config(&config),
    )
    .context("Failed to build session service")?;
    let session_service = Arc::new(session_service);

    // Create shared app state
    let app_state = AppState::new(session_service, db_pool, cache);

    let cors = routes::configure_cors(config.cors_allowed_origins.as_deref());
    let app = routes::create_router(app_state, cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check at http://{}/health", addr);

    // Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
