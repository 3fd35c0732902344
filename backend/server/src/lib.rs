//! Documentation of the Authors backend, a publishing platform for articles.
//!
//!
//!
//! # General Infrastructure
//! - One axum server exposes a JSON API under `/api`
//! - Every response is wrapped in a JSend envelope (`status`, `data` or `message`)
//! - Relational data lives in RAM and every change is written through to `DATA_PATH`
//! - One-time email tokens live in Redis when `REDIS_URL` is set, in RAM otherwise
//! - Outgoing email goes through a background worker, never on the request path
//!
//!
//!
//! # Authentication
//!
//! - Passwords are stored as salted PBKDF2-SHA256 hashes
//! - Login returns an HS256 JWT carrying the user id, username and expiry
//! - Clients send it back as `Authorization: Token <jwt>` (`Bearer` works too)
//! - Missing or broken credentials answer 403, unverified accounts answer 401 on writes
//! - Verification and password reset links carry single use tokens consumed on first hit
//!
//!
//!
//! # Notifications
//!
//! Publishing an article fans out one notification per follower of its author, once.
//! Followers with `is_subscribed` also get an email. Likes, dislikes and favourites
//! notify the article author.
//!
//!
//!
//! # Setup
//!
//! View current docs.
//! ```sh
//! cargo doc --open
//! `````
//!
//! Run with an on-disk snapshot.
//! ```sh
//! RUST_LOG=server=debug cargo run -p authors -- --port 8000 --data authors.json
//! `````
//!
//! Log outgoing email bodies.
//! ```sh
//! cargo run -p authors --features server/verbose
//! `````
use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
};
use tokio::{net::TcpListener, signal::ctrl_c};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod fanout;
pub mod mail;
pub mod models;
pub mod render;
pub mod routes;
pub mod social;
pub mod state;
pub mod tokens;
pub mod utils;

use config::{Config, Overrides};
use error::AppError;
use state::AppState;

/// Full application: routes plus tracing and CORS layers.
pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub async fn start_server(overrides: Overrides) -> Result<(), AppError> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Loading config...");
    let config = Config::load()?.apply(overrides);

    info!("Initializing state...");
    let state = AppState::new(config).await?;

    info!("Starting server...");

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutting down...");
    state.db.save().await
}

async fn shutdown_signal() {
    let received = next_signal().await;
    info!("Received {received}, draining connections");
}

/// Waits for Ctrl+C, or SIGTERM where the platform has it.
#[cfg(unix)]
async fn next_signal() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!("SIGTERM unavailable ({e}), only Ctrl+C stops the server");
            return interrupted().await;
        }
    };

    tokio::select! {
        name = interrupted() => name,
        _ = terminate.recv() => "SIGTERM",
    }
}

#[cfg(not(unix))]
async fn next_signal() -> &'static str {
    interrupted().await
}

async fn interrupted() -> &'static str {
    if let Err(e) = ctrl_c().await {
        warn!("Ctrl+C handler unavailable: {e}");
        std::future::pending::<()>().await;
    }

    "Ctrl+C"
}
