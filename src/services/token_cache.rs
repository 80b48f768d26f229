// SPDX-License-Identifier: MIT

//! Direct-account token cache.
//!
//! Tokens live in the CredentialStore and are refreshed against the vendor
//! when the freshness window (declared TTL minus a 10-minute margin) closes.
//! Refreshes for the same appid are single-flight: one caller talks to the
//! vendor, concurrent callers reuse the persisted result.

use crate::error::AppError;
use crate::models::{CredentialRecord, Registration};
use crate::services::wechat::WechatClient;
use crate::services::{refresh_guard, RefreshGuards};
use crate::store::{namespaces, CredentialStore};
use chrono::Utc;

/// Per-account direct-token fetch/refresh on top of the CredentialStore.
#[derive(Clone)]
pub struct TokenCache {
    client: WechatClient,
    store: CredentialStore,
    guards: RefreshGuards,
}

impl TokenCache {
    pub fn new(client: WechatClient, store: CredentialStore, guards: RefreshGuards) -> Self {
        Self {
            client,
            store,
            guards,
        }
    }

    /// Return a valid access token for the account, calling the vendor only
    /// when the cached record is stale (or `force` is set).
    pub async fn fetch_token(
        &self,
        appid: &str,
        secret: Option<&str>,
        force: bool,
    ) -> Result<String, AppError> {
        if appid.is_empty() {
            return Err(AppError::Param("appid is empty".to_string()));
        }

        let record = self.load(appid).await?;
        if !force {
            if let Some(record) = &record {
                if record.is_fresh(Utc::now()) {
                    return Ok(record.access_token.clone());
                }
            }
        }

        let secret = self.resolve_secret(appid, secret, record.as_ref()).await?;

        // Single-flight: first caller past the freshness check refreshes,
        // waiters re-check and reuse its persisted result.
        let guard = refresh_guard(&self.guards, namespaces::DIRECT_TOKENS, appid);
        let _held = guard.lock().await;

        let record = self.load(appid).await?;
        if !force {
            if let Some(record) = &record {
                if record.is_fresh(Utc::now()) {
                    return Ok(record.access_token.clone());
                }
            }
        }

        let response = self.client.direct_token(appid, &secret).await?;

        let now = Utc::now();
        let updated = CredentialRecord {
            appid: appid.to_string(),
            secret: Some(secret),
            access_token: response.access_token,
            expires_in: response.expires_in,
            created_at: record.as_ref().map(|r| r.created_at).unwrap_or(now),
            updated_at: now,
        };
        self.store
            .set(namespaces::DIRECT_TOKENS, appid, &updated)
            .await?;

        tracing::info!(appid, "Direct token refreshed");
        Ok(updated.access_token)
    }

    /// Persist a registration for the account and warm the token cache.
    pub async fn register_account(
        &self,
        appid: &str,
        secret: &str,
        extra: serde_json::Map<String, serde_json::Value>,
    ) -> Result<String, AppError> {
        if appid.is_empty() || secret.is_empty() {
            return Err(AppError::Param("appid/secret are required".to_string()));
        }

        let registration = Registration {
            appid: appid.to_string(),
            secret: secret.to_string(),
            extra,
            created_at: Utc::now(),
        };
        self.store
            .set(namespaces::REGISTRATIONS, appid, &registration)
            .await?;

        tracing::info!(appid, "Account registered");
        self.fetch_token(appid, Some(secret), false).await
    }

    async fn load(&self, appid: &str) -> Result<Option<CredentialRecord>, AppError> {
        self.store
            .get::<CredentialRecord>(namespaces::DIRECT_TOKENS, appid)
            .await
    }

    /// Secret resolution order: explicit argument, then the registration of
    /// record, then whatever the token record itself carries.
    async fn resolve_secret(
        &self,
        appid: &str,
        secret: Option<&str>,
        record: Option<&CredentialRecord>,
    ) -> Result<String, AppError> {
        if let Some(secret) = secret {
            return Ok(secret.to_string());
        }

        if let Some(registration) = self
            .store
            .get::<Registration>(namespaces::REGISTRATIONS, appid)
            .await?
        {
            return Ok(registration.secret);
        }

        if let Some(secret) = record.and_then(|r| r.secret.clone()) {
            return Ok(secret);
        }

        Err(AppError::MissingCredentials(format!(
            "no secret known for {}",
            appid
        )))
    }
}
