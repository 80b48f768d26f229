// SPDX-License-Identifier: MIT

//! WeChat token broker server.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wechat_token_broker::{
    config::{Config, StoreBackend},
    store::CredentialStore,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting WeChat token broker");

    let store = match config.store_backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; credentials will not survive restarts");
            CredentialStore::memory()
        }
        StoreBackend::Firestore => CredentialStore::firestore(&config.gcp_project_id)
            .await
            .expect("Failed to connect to Firestore"),
    };

    let port = config.port;
    let state = Arc::new(AppState::new(config, store).expect("Failed to wire services"));

    let app = wechat_token_broker::routes::create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wechat_token_broker=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
