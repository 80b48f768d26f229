// SPDX-License-Identifier: MIT

//! Services module - credential lifecycle and webhook pipeline.

pub mod component;
pub mod crypto;
pub mod ticket_ring;
pub mod token_cache;
pub mod verifier;
pub mod wechat;

pub use component::{AuthUrlKind, ComponentCredentialManager};
pub use crypto::MessageCryptor;
pub use ticket_ring::TicketRing;
pub use token_cache::TokenCache;
pub use verifier::{VerifyQuery, WebhookVerifier};
pub use wechat::WechatClient;

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Per-(namespace, key) refresh locks, shared by every service so concurrent
/// refreshes of the same credential collapse into a single upstream call.
pub type RefreshGuards = Arc<DashMap<(String, String), Arc<Mutex<()>>>>;

/// The guard for one (namespace, key) slot, created on first use.
pub(crate) fn refresh_guard(
    guards: &RefreshGuards,
    namespace: &str,
    key: &str,
) -> Arc<Mutex<()>> {
    guards
        .entry((namespace.to_string(), key.to_string()))
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}
