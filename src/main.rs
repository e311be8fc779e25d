// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Campus-Auth local session agent
//!
//! Owns the signed-in session for this device and serves it to the campus
//! UI surfaces over a loopback HTTP API.

use campus_auth::{
    config::Config,
    db::FirestoreDb,
    services::{
        spawn_inactivity_watchdog, FileKvStore, IdentityToolkitClient, SessionCache,
        SessionManager, SessionOptions,
    },
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        fallback_policy = ?config.fallback_policy,
        "Starting Campus-Auth agent"
    );

    // Initialize Firestore database
    let db = FirestoreDb::new(&config.gcp_project_id).await?;

    let identity =
        IdentityToolkitClient::new(config.identity_base_url.clone(), config.identity_api_key.clone())?;

    let cache = SessionCache::new(FileKvStore::new(config.session_cache_path.clone()));
    tracing::info!(path = %config.session_cache_path.display(), "Session cache opened");

    let sessions = Arc::new(SessionManager::new(
        identity,
        db,
        cache,
        SessionOptions::from(&config),
    ));

    // Show the last known user before any network round-trip.
    if let Some(user) = sessions.restore() {
        tracing::info!(user_id = %user.id, "Restored cached session");
    }

    if let Some(timeout) = config.inactivity_timeout {
        spawn_inactivity_watchdog(sessions.clone());
        tracing::info!(timeout_secs = timeout.as_secs(), "Inactivity auto-logout enabled");
    }

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        sessions,
    });

    // Build router
    let app = campus_auth::routes::create_router(state);

    // Start server
    let addr = format!("{}:{}", config.bind_addr, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Agent listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("campus_auth=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();

    Ok(())
}
