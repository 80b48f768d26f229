// SPDX-License-Identifier: MIT

//! Webhook routes for vendor event delivery.

use crate::error::Result;
use crate::services::VerifyQuery;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Query, State},
    routing::get,
    Router,
};
use std::sync::Arc;

/// Webhook routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/wx/event", get(handshake).post(handle_event))
}

/// Endpoint-registration handshake (GET): echo `echostr` back.
async fn handshake(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VerifyQuery>,
) -> Result<String> {
    state.verifier.verify_echo(&query)
}

/// Event delivery (POST).
///
/// The vendor redelivers unless it reads the literal body `success`
/// promptly, so that is the entire success response.
async fn handle_event(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VerifyQuery>,
    body: Bytes,
) -> Result<&'static str> {
    let event = state.verifier.handle_event(&query, &body).await?;
    tracing::debug!(
        info_type = event.get("InfoType").and_then(|v| v.as_str()).unwrap_or(""),
        "Webhook event handled"
    );
    Ok("success")
}
