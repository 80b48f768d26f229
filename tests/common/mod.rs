// SPDX-License-Identifier: MIT

//! Shared test fixtures: an offline app over the in-memory store and a mock
//! vendor server with per-endpoint call counters.

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use wechat_token_broker::config::Config;
use wechat_token_broker::store::CredentialStore;
use wechat_token_broker::AppState;

/// App state over a fresh in-memory store, pointed at the given vendor URL.
#[allow(dead_code)]
pub fn test_state(api_base_url: &str) -> Arc<AppState> {
    let mut config = Config::test_default();
    config.api_base_url = api_base_url.to_string();
    Arc::new(AppState::new(config, CredentialStore::memory()).expect("test state should build"))
}

/// In-process stand-in for the vendor API.
///
/// Serves the five upstream endpoints on an ephemeral port and records every
/// call so tests can assert exact upstream-call counts.
pub struct MockVendor {
    pub base_url: String,
    state: Arc<VendorState>,
}

struct VendorState {
    token_calls: AtomicUsize,
    component_calls: AtomicUsize,
    preauth_calls: AtomicUsize,
    query_auth_calls: AtomicUsize,
    authorizer_calls: AtomicUsize,
    /// Verify tickets the component-token endpoint accepts.
    accepted_tickets: HashSet<String>,
    /// Tickets attempted against the component-token endpoint, in order.
    component_attempts: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl MockVendor {
    /// Start a vendor that accepts every ticket.
    pub async fn start() -> Self {
        Self::start_accepting(&["*"]).await
    }

    /// Start a vendor that only accepts the given verify tickets
    /// (`"*"` accepts anything).
    pub async fn start_accepting(accepted_tickets: &[&str]) -> Self {
        let state = Arc::new(VendorState {
            token_calls: AtomicUsize::new(0),
            component_calls: AtomicUsize::new(0),
            preauth_calls: AtomicUsize::new(0),
            query_auth_calls: AtomicUsize::new(0),
            authorizer_calls: AtomicUsize::new(0),
            accepted_tickets: accepted_tickets.iter().map(|t| t.to_string()).collect(),
            component_attempts: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/cgi-bin/token", get(direct_token))
            .route(
                "/cgi-bin/component/api_component_token",
                post(component_token),
            )
            .route(
                "/cgi-bin/component/api_create_preauthcode",
                post(create_preauthcode),
            )
            .route("/cgi-bin/component/api_query_auth", post(query_auth))
            .route(
                "/cgi-bin/component/api_authorizer_token",
                post(authorizer_token),
            )
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock vendor");
        let base_url = format!("http://{}", listener.local_addr().expect("local addr"));
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve mock vendor");
        });

        Self { base_url, state }
    }

    pub fn token_calls(&self) -> usize {
        self.state.token_calls.load(Ordering::SeqCst)
    }

    pub fn component_calls(&self) -> usize {
        self.state.component_calls.load(Ordering::SeqCst)
    }

    pub fn preauth_calls(&self) -> usize {
        self.state.preauth_calls.load(Ordering::SeqCst)
    }

    pub fn query_auth_calls(&self) -> usize {
        self.state.query_auth_calls.load(Ordering::SeqCst)
    }

    pub fn authorizer_calls(&self) -> usize {
        self.state.authorizer_calls.load(Ordering::SeqCst)
    }

    /// Tickets attempted against the component-token endpoint, in order.
    pub fn component_attempts(&self) -> Vec<String> {
        self.state
            .component_attempts
            .lock()
            .expect("attempts lock")
            .clone()
    }
}

async fn direct_token(
    State(state): State<Arc<VendorState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    // Small delay so concurrent callers genuinely overlap in
    // single-flight tests.
    tokio::time::sleep(std::time::Duration::from_millis(25)).await;

    if params.get("secret").map(String::is_empty).unwrap_or(true) {
        return Json(json!({ "errcode": 41004, "errmsg": "appsecret missing" }));
    }

    let n = state.token_calls.fetch_add(1, Ordering::SeqCst) + 1;
    Json(json!({ "access_token": format!("AT{}", n), "expires_in": 7200 }))
}

async fn component_token(
    State(state): State<Arc<VendorState>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.component_calls.fetch_add(1, Ordering::SeqCst);

    let ticket = body["component_verify_ticket"].as_str().unwrap_or("");
    state
        .component_attempts
        .lock()
        .expect("attempts lock")
        .push(ticket.to_string());

    if state.accepted_tickets.contains("*") || state.accepted_tickets.contains(ticket) {
        Json(json!({
            "component_access_token": format!("CT-{}", ticket),
            "expires_in": 7200
        }))
    } else {
        Json(json!({ "errcode": 61006, "errmsg": "component verify ticket expired" }))
    }
}

async fn create_preauthcode(
    State(state): State<Arc<VendorState>>,
    Json(_body): Json<Value>,
) -> Json<Value> {
    let n = state.preauth_calls.fetch_add(1, Ordering::SeqCst) + 1;
    Json(json!({ "pre_auth_code": format!("PRE{}", n), "expires_in": 600 }))
}

async fn query_auth(State(state): State<Arc<VendorState>>, Json(body): Json<Value>) -> Json<Value> {
    state.query_auth_calls.fetch_add(1, Ordering::SeqCst);

    let code = body["authorization_code"].as_str().unwrap_or("");
    Json(json!({
        "authorization_info": {
            "authorizer_appid": "wx_authorizer_1",
            "authorizer_access_token": format!("AAT-{}", code),
            "expires_in": 7200,
            "authorizer_refresh_token": format!("ART-{}", code),
            "func_info": [
                { "funcscope_category": { "id": 1 } },
                { "funcscope_category": { "id": 15 } }
            ]
        }
    }))
}

async fn authorizer_token(
    State(state): State<Arc<VendorState>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let n = state.authorizer_calls.fetch_add(1, Ordering::SeqCst) + 1;

    let appid = body["authorizer_appid"].as_str().unwrap_or("");
    Json(json!({
        "authorizer_access_token": format!("AAT-refreshed-{}-{}", appid, n),
        "expires_in": 7200,
        "authorizer_refresh_token": format!("ART-rotated-{}", n)
    }))
}
