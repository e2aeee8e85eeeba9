// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Study Tracker API Server
//!
//! Logs into the academy portal for each registered student and keeps
//! their class schedule in sync for the chat bot and web UI.

use std::sync::Arc;
use study_tracker::{
    config::{Config, StoreBackend},
    db::{FirestoreDb, MemoryStore, Store},
    services::BrowserAuthenticator,
    time_utils::SystemClock,
    AppState,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Study Tracker API");

    // Initialize storage
    let db: Store = match config.store_backend {
        StoreBackend::Firestore => Arc::new(
            FirestoreDb::new(&config.gcp_project_id)
                .await
                .expect("Failed to connect to Firestore"),
        ),
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store, data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let authenticator = Arc::new(BrowserAuthenticator::new(config.portal.clone()));
    tracing::info!(
        headless = config.portal.headless,
        timeout_secs = config.portal.timeout.as_secs(),
        "Portal authenticator initialized"
    );

    // Build shared state
    let state = Arc::new(
        AppState::new(config.clone(), db, authenticator, Arc::new(SystemClock))
            .expect("Failed to initialize services"),
    );

    // Build router
    let app = study_tracker::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("study_tracker=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
