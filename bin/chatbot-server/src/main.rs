//! chatbot-server – entry point.
//!
//! Startup order:
//! 1. Parse configuration from environment variables.
//! 2. Initialise structured tracing (JSON in production, pretty in dev),
//!    optionally mirrored to a daily log file.
//! 3. Open the SQLite database and run pending migrations.
//! 4. Build the Gemini client and the token issuer.
//! 5. Build the Axum router and start the HTTP server with graceful shutdown.

mod auth;
mod config;
mod db;
mod error;
mod gemini;
mod middleware;
mod routes;
mod schemas;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use uuid::Uuid;

use crate::auth::TokenIssuer;
use crate::config::Config;
use crate::db::sqlite::SqliteStore;
use crate::gemini::GeminiClient;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Configuration ───────────────────────────────────────────────────────
    let cfg = Config::from_env();

    // ── 2. Tracing ─────────────────────────────────────────────────────────────
    let env_filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match cfg.log_level.parse::<tracing_subscriber::EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: CHATBOT_LOG='{}' is not a valid tracing filter ({}); \
                     falling back to 'info'",
                    cfg.log_level, e
                );
                tracing_subscriber::EnvFilter::new("info")
            }
        },
    };

    let stdout_layer = if cfg.log_json {
        tracing_subscriber::fmt::layer().json().with_target(true).boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(true).with_thread_ids(true).boxed()
    };

    // The guard flushes buffered file output on drop; keep it for the whole run.
    let (file_layer, _file_guard) = match cfg.log_dir.as_deref() {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "chatbot-server.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "chatbot-server starting");

    // ── 3. Database ────────────────────────────────────────────────────────────
    let store = SqliteStore::connect(&cfg.database_url).await?;
    info!(database_url = %cfg.database_url, "database ready");

    // ── 4. Model provider and auth ─────────────────────────────────────────────
    if cfg.google_api_key.is_none() {
        warn!("GOOGLE_API_KEY is not set; /api/chat will fail until it is configured");
    }
    let model = GeminiClient::new(
        &cfg.gemini_base_url,
        cfg.gemini_model.clone(),
        cfg.google_api_key.clone(),
        Duration::from_secs(cfg.upstream_timeout_secs),
    )?;
    info!(model = %cfg.gemini_model, "gemini client ready");

    let secret = match cfg.jwt_secret.clone() {
        Some(secret) => secret,
        None => {
            warn!("JWT_SECRET is not set; issued tokens will not survive a restart");
            format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
        }
    };
    let tokens = TokenIssuer::new(&secret, cfg.token_ttl_hours);

    // ── 5. Shared application state ────────────────────────────────────────────
    let state = Arc::new(AppState {
        config: Arc::new(cfg.clone()),
        store: Arc::new(store),
        model: Arc::new(model),
        tokens: Arc::new(tokens),
    });

    // ── 6. HTTP server with graceful shutdown ──────────────────────────────────
    let app = routes::build(Arc::clone(&state));
    let addr: SocketAddr = cfg.bind_address.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, swagger = cfg.enable_swagger, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("chatbot-server stopped");
    Ok(())
}

/// Returns a future that resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; starting graceful shutdown");
}
