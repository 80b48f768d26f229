// SPDX-License-Identifier: MIT

//! WeChat token broker
//!
//! Brokers and caches vendor-issued credentials for the direct-account token
//! flow and the open-platform delegated-authorization flow, and verifies the
//! signed webhook events that feed verify tickets into the latter.

pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;
pub mod xml;

use config::Config;
use dashmap::DashMap;
use error::AppError;
use services::{
    ComponentCredentialManager, RefreshGuards, TicketRing, TokenCache, WebhookVerifier,
    WechatClient,
};
use std::sync::Arc;
use store::CredentialStore;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: CredentialStore,
    pub token_cache: TokenCache,
    pub component: ComponentCredentialManager,
    pub verifier: WebhookVerifier,
}

impl AppState {
    /// Wire the services over a store. The refresh-guard map is shared so
    /// all services coordinate refreshes per (namespace, key).
    pub fn new(config: Config, store: CredentialStore) -> Result<Self, AppError> {
        let client = WechatClient::new(config.api_base_url.clone());
        let guards: RefreshGuards = Arc::new(DashMap::new());
        let ring = TicketRing::new(store.clone());

        let token_cache = TokenCache::new(client.clone(), store.clone(), guards.clone());
        let component = ComponentCredentialManager::new(
            client,
            store.clone(),
            ring.clone(),
            guards,
            config.component_appid.clone(),
            config.component_appsecret.clone(),
        );
        let verifier = WebhookVerifier::new(
            config.message_token.clone(),
            &config.encoding_aes_key,
            config.component_appid.clone(),
            ring,
        )?;

        Ok(Self {
            config,
            store,
            token_cache,
            component,
            verifier,
        })
    }
}
