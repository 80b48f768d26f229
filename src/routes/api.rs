// SPDX-License-Identifier: MIT

//! Credential API routes: registration, direct tokens, authorizer tokens,
//! auth-code exchange, authorization URLs.

use crate::error::{AppError, Result};
use crate::models::{AuthUrl, AuthorizationRecord};
use crate::services::AuthUrlKind;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Credential API routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/mp/register", post(register_account))
        .route("/mp/access_token/{appid}", get(direct_access_token))
        .route("/open/access_token/{appid}", get(authorizer_access_token))
        .route("/open/mpinfo", get(auth_code_info))
        .route("/open/authurl", get(auth_url_get).post(auth_url_post))
}

/// `force` crosses the transport boundary as a string (or not at all);
/// normalize it to a strict bool before it reaches core logic.
fn normalize_force(raw: Option<&str>) -> bool {
    matches!(
        raw.map(|s| s.to_ascii_lowercase()).as_deref(),
        Some("true") | Some("1")
    )
}

#[derive(Serialize)]
struct TokenBody {
    access_token: String,
}

#[derive(Deserialize)]
struct RegisterRequest {
    appid: String,
    secret: String,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

/// Register an account and warm its token cache.
async fn register_account(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<TokenBody>> {
    let access_token = state
        .token_cache
        .register_account(&request.appid, &request.secret, request.extra)
        .await?;
    Ok(Json(TokenBody { access_token }))
}

#[derive(Deserialize)]
struct TokenParams {
    #[serde(default)]
    force: Option<String>,
    #[serde(default)]
    secret: Option<String>,
}

/// Direct-account access token, cached with the freshness window.
async fn direct_access_token(
    State(state): State<Arc<AppState>>,
    Path(appid): Path<String>,
    Query(params): Query<TokenParams>,
) -> Result<Json<TokenBody>> {
    let force = normalize_force(params.force.as_deref());
    let access_token = state
        .token_cache
        .fetch_token(&appid, params.secret.as_deref(), force)
        .await?;
    Ok(Json(TokenBody { access_token }))
}

/// Authorizer access token via the component flow.
async fn authorizer_access_token(
    State(state): State<Arc<AppState>>,
    Path(appid): Path<String>,
    Query(params): Query<TokenParams>,
) -> Result<Json<TokenBody>> {
    let force = normalize_force(params.force.as_deref());
    let access_token = state.component.get_authorizer_token(&appid, force).await?;
    Ok(Json(TokenBody { access_token }))
}

#[derive(Deserialize)]
struct AuthCodeParams {
    #[serde(default)]
    auth_code: Option<String>,
}

/// Exchange an auth code for the authorization record (idempotent).
async fn auth_code_info(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuthCodeParams>,
) -> Result<Json<AuthorizationRecord>> {
    let auth_code = params
        .auth_code
        .ok_or_else(|| AppError::Param("auth_code is required".to_string()))?;
    let record = state.component.exchange_auth_code(&auth_code).await?;
    Ok(Json(record))
}

#[derive(Deserialize)]
struct AuthUrlParams {
    /// `mobile` (default) or `scancode`.
    #[serde(default, alias = "type")]
    kind: Option<String>,
    #[serde(default)]
    redirect_uri: Option<String>,
    #[serde(default)]
    auth_type: Option<i64>,
    #[serde(default)]
    biz_appid: Option<String>,
}

async fn auth_url_get(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuthUrlParams>,
) -> Result<Json<AuthUrl>> {
    issue_auth_url(&state, params).await
}

async fn auth_url_post(
    State(state): State<Arc<AppState>>,
    Json(params): Json<AuthUrlParams>,
) -> Result<Json<AuthUrl>> {
    issue_auth_url(&state, params).await
}

async fn issue_auth_url(state: &AppState, params: AuthUrlParams) -> Result<Json<AuthUrl>> {
    let kind = match params.kind.as_deref() {
        None => AuthUrlKind::Mobile,
        Some(kind) => kind.parse()?,
    };
    let redirect_uri = params
        .redirect_uri
        .ok_or_else(|| AppError::Param("redirect_uri is required".to_string()))?;

    let auth_url = state
        .component
        .issue_auth_url(
            kind,
            &redirect_uri,
            params.auth_type,
            params.biz_appid.as_deref(),
        )
        .await?;
    Ok(Json(auth_url))
}
