//! PsyFi Auth Server
//!
//! Issues wallet challenges, verifies signed responses and manages the
//! resulting sessions and credentials.

use anyhow::Context;
use axum::http::{HeaderName, HeaderValue, Method};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};

use psyfi_server::auth::{session_purger, AuthBackends, AuthService};
use psyfi_server::config::Config;
use psyfi_server::middleware::{self, RateLimiter, SESSION_ID_HEADER};
use psyfi_server::state::AppState;
use psyfi_server::store::{PgIdentityRepository, PgSessionRepository, RedisCache};
use psyfi_server::{db, routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

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

    tracing::info!(environment = config.environment.as_str(), "Starting PsyFi auth server");

    let db_pool = db::create_pool(&config).await?;
    db::run_migrations(&db_pool).await?;

    tracing::info!("Connecting to cache at {}", config.redis_url_masked());
    let cache = RedisCache::connect(
        &config.redis_url,
        config.store.connect_timeout,
        config.store.operation_timeout,
    )
    .await
    .context("Failed to connect to Redis")?;

    let backends = AuthBackends {
        cache: Arc::new(cache),
        identities: Arc::new(PgIdentityRepository::new(
            db_pool.clone(),
            config.store.operation_timeout,
        )),
        sessions: Arc::new(PgSessionRepository::new(
            db_pool.clone(),
            config.store.operation_timeout,
        )),
    };
    let auth_service = Arc::new(AuthService::new(backends, &config.auth, &config.store));

    // Start session purger in background
    let purger_service = auth_service.clone();
    let purge_interval = Duration::from_secs(config.session_purge_interval_seconds);
    tokio::spawn(async move {
        session_purger(purger_service, purge_interval).await;
        tracing::error!("Session purger task exited unexpectedly");
    });

    if !config.trusted_proxies.is_empty() {
        tracing::info!(proxies = ?config.trusted_proxies, "Honouring X-Forwarded-For from trusted proxies");
    }
    let rate_limiter = RateLimiter::new(config.rate_limit_rps, config.trusted_proxies.clone());
    let idle_limiter = rate_limiter.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(60)).await;
            idle_limiter.prune_idle(Duration::from_secs(300)).await;
        }
    });

    let mut app = routes::create_router(AppState::new(auth_service))
        .layer(axum::middleware::from_fn_with_state(
            rate_limiter,
            middleware::rate_limit,
        ))
        .layer(configure_cors(config.cors_allowed_origins.as_deref()));

    if config.environment.is_production() {
        app = app.layer(axum::middleware::from_fn(middleware::hsts_header));
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check at http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn configure_cors(allowed_origins: Option<&str>) -> CorsLayer {
    let allowed_origins = allowed_origins.unwrap_or_default();

    if allowed_origins.trim().is_empty() {
        tracing::warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (permissive)");
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static(SESSION_ID_HEADER)])
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
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
