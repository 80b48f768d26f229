// SPDX-License-Identifier: MIT

//! Open-platform credential manager.
//!
//! Issues and caches the platform-level component token from verify tickets
//! (with fallback to the previous ticket), refreshes per-authorizer tokens,
//! exchanges one-time authorization codes idempotently, and builds the
//! authorization redirect URLs.

use crate::error::AppError;
use crate::models::{AuthCodeMapping, AuthUrl, AuthorizationRecord, ComponentToken};
use crate::services::ticket_ring::TicketRing;
use crate::services::wechat::WechatClient;
use crate::services::{refresh_guard, RefreshGuards};
use crate::store::{namespaces, CredentialStore};
use chrono::Utc;

const LOGIN_PAGE_BASE: &str = "https://mp.weixin.qq.com/cgi-bin/componentloginpage";
const BIND_PAGE_BASE: &str = "https://mp.weixin.qq.com/safe/bindcomponent";

/// Which authorization entry page to build a URL for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthUrlKind {
    /// Mobile quick-authorize link (sent to the account admin in chat).
    Mobile,
    /// Desktop scan-code authorization page.
    Scancode,
}

impl std::str::FromStr for AuthUrlKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mobile" => Ok(AuthUrlKind::Mobile),
            "scancode" => Ok(AuthUrlKind::Scancode),
            other => Err(AppError::Param(format!("unknown auth url kind: {}", other))),
        }
    }
}

/// Platform credential manager. Stateless over the CredentialStore; safe to
/// clone per request.
#[derive(Clone)]
pub struct ComponentCredentialManager {
    client: WechatClient,
    store: CredentialStore,
    ring: TicketRing,
    guards: RefreshGuards,
    component_appid: String,
    component_appsecret: String,
}

impl ComponentCredentialManager {
    pub fn new(
        client: WechatClient,
        store: CredentialStore,
        ring: TicketRing,
        guards: RefreshGuards,
        component_appid: String,
        component_appsecret: String,
    ) -> Self {
        Self {
            client,
            store,
            ring,
            guards,
            component_appid,
            component_appsecret,
        }
    }

    /// Return a valid component access token, minting one from the cached
    /// verify tickets when the stored token is past its 110-minute window.
    pub async fn get_component_token(&self) -> Result<String, AppError> {
        if let Some(token) = self.load_component_token().await? {
            if token.is_fresh(Utc::now()) {
                return Ok(token.component_access_token);
            }
        }

        let guard = refresh_guard(
            &self.guards,
            namespaces::COMPONENT_TOKENS,
            &self.component_appid,
        );
        let _held = guard.lock().await;

        if let Some(token) = self.load_component_token().await? {
            if token.is_fresh(Utc::now()) {
                return Ok(token.component_access_token);
            }
        }

        let tickets = self.ring.list(&self.component_appid).await?;
        if tickets.is_empty() {
            return Err(AppError::NoTicketAvailable);
        }

        // The newest ticket can be rejected right after a rotation; the
        // previous one is the fallback.
        let mut issued = self
            .client
            .component_token(
                &self.component_appid,
                &self.component_appsecret,
                &tickets[0].component_verify_ticket,
            )
            .await?;
        if issued.is_none() {
            if let Some(previous) = tickets.get(1) {
                tracing::warn!("Newest verify ticket rejected, retrying with previous");
                issued = self
                    .client
                    .component_token(
                        &self.component_appid,
                        &self.component_appsecret,
                        &previous.component_verify_ticket,
                    )
                    .await?;
            }
        }
        let response = issued.ok_or(AppError::TicketIssuanceFailed)?;

        let token = ComponentToken {
            component_access_token: response.component_access_token,
            expires_in: response.expires_in,
            created_at: Utc::now(),
        };
        self.store
            .set(namespaces::COMPONENT_TOKENS, &self.component_appid, &token)
            .await?;

        tracing::info!("Component token minted");
        Ok(token.component_access_token)
    }

    /// Return a valid access token for an authorizer, refreshing through the
    /// component token when the record is stale (or `force` is set).
    pub async fn get_authorizer_token(
        &self,
        authorizer_appid: &str,
        force: bool,
    ) -> Result<String, AppError> {
        if authorizer_appid.is_empty() {
            return Err(AppError::Param("authorizer appid is empty".to_string()));
        }

        let record = self
            .load_authorizer(authorizer_appid)
            .await?
            .ok_or_else(|| AppError::UnknownAuthorizer(authorizer_appid.to_string()))?;
        if !force && record.is_fresh(Utc::now()) {
            return Ok(record.authorizer_access_token);
        }

        let guard = refresh_guard(&self.guards, namespaces::AUTHORIZERS, authorizer_appid);
        let _held = guard.lock().await;

        let record = self
            .load_authorizer(authorizer_appid)
            .await?
            .ok_or_else(|| AppError::UnknownAuthorizer(authorizer_appid.to_string()))?;
        if !force && record.is_fresh(Utc::now()) {
            return Ok(record.authorizer_access_token);
        }

        let component_token = self.get_component_token().await?;
        let response = self
            .client
            .authorizer_token(
                &component_token,
                &self.component_appid,
                authorizer_appid,
                &record.authorizer_refresh_token,
            )
            .await?;

        // The refresh token only rotates sometimes; keep the old one when
        // the response omits it.
        let refresh_token = response
            .authorizer_refresh_token
            .unwrap_or_else(|| record.authorizer_refresh_token.clone());
        let updated = AuthorizationRecord {
            authorizer_access_token: response.authorizer_access_token,
            authorizer_refresh_token: refresh_token,
            expires_in: response.expires_in,
            updated_at: Utc::now(),
            ..record
        };
        self.store
            .set(namespaces::AUTHORIZERS, authorizer_appid, &updated)
            .await?;

        tracing::info!(authorizer_appid, "Authorizer token refreshed");
        Ok(updated.authorizer_access_token)
    }

    /// Exchange a one-time authorization code for an AuthorizationRecord.
    ///
    /// Auth codes are single-use upstream, so a code seen before returns the
    /// cached record without touching the vendor.
    pub async fn exchange_auth_code(
        &self,
        auth_code: &str,
    ) -> Result<AuthorizationRecord, AppError> {
        if auth_code.is_empty() {
            return Err(AppError::Param("auth_code is empty".to_string()));
        }

        if let Some(mapping) = self
            .store
            .get::<AuthCodeMapping>(namespaces::AUTH_CODES, auth_code)
            .await?
        {
            if let Some(record) = self.load_authorizer(&mapping.authorizer_appid).await? {
                tracing::debug!(
                    authorizer_appid = %mapping.authorizer_appid,
                    "Auth code already exchanged, returning cached record"
                );
                return Ok(record);
            }
        }

        let component_token = self.get_component_token().await?;
        let response = self
            .client
            .query_auth(&component_token, &self.component_appid, auth_code)
            .await?;
        let info = response.authorization_info.ok_or(AppError::AuthQueryFailed)?;

        let now = Utc::now();
        let record = AuthorizationRecord {
            authorizer_appid: info.authorizer_appid.clone(),
            authorizer_access_token: info.authorizer_access_token,
            authorizer_refresh_token: info.authorizer_refresh_token,
            expires_in: info.expires_in,
            func_info: info
                .func_info
                .iter()
                .map(|f| f.funcscope_category.id)
                .collect(),
            created_at: now,
            updated_at: now,
        };

        self.store
            .set(
                namespaces::AUTH_CODES,
                auth_code,
                &AuthCodeMapping {
                    authorizer_appid: info.authorizer_appid.clone(),
                },
            )
            .await?;
        self.store
            .set(namespaces::AUTHORIZERS, &info.authorizer_appid, &record)
            .await?;

        tracing::info!(authorizer_appid = %info.authorizer_appid, "Auth code exchanged");
        Ok(record)
    }

    /// Create a pre-auth code and build the authorization entry URL.
    ///
    /// `auth_type` and `biz_appid` are mutually exclusive; `auth_type` wins
    /// and defaults to 3 when neither is given.
    pub async fn issue_auth_url(
        &self,
        kind: AuthUrlKind,
        redirect_uri: &str,
        auth_type: Option<i64>,
        biz_appid: Option<&str>,
    ) -> Result<AuthUrl, AppError> {
        if redirect_uri.is_empty() {
            return Err(AppError::Param("redirect_uri is required".to_string()));
        }

        let component_token = self.get_component_token().await?;
        let response = self
            .client
            .create_preauthcode(&component_token, &self.component_appid)
            .await?;
        let pre_auth_code = response.pre_auth_code.ok_or(AppError::PreauthCodeFailed)?;

        let url = self.build_auth_url(kind, &pre_auth_code, redirect_uri, auth_type, biz_appid);
        Ok(AuthUrl {
            url,
            expires_in: response.expires_in,
            created_at: Utc::now(),
        })
    }

    /// Parameter order and the `#wechat_redirect` fragment are load-bearing
    /// for vendor acceptance.
    fn build_auth_url(
        &self,
        kind: AuthUrlKind,
        pre_auth_code: &str,
        redirect_uri: &str,
        auth_type: Option<i64>,
        biz_appid: Option<&str>,
    ) -> String {
        let mut query = format!(
            "component_appid={}&pre_auth_code={}&redirect_uri={}",
            self.component_appid,
            pre_auth_code,
            urlencoding::encode(redirect_uri),
        );
        match (auth_type, biz_appid) {
            (Some(auth_type), _) => query += &format!("&auth_type={}", auth_type),
            (None, Some(biz_appid)) => query += &format!("&biz_appid={}", biz_appid),
            (None, None) => query += "&auth_type=3",
        }

        match kind {
            AuthUrlKind::Scancode => format!("{}?{}", LOGIN_PAGE_BASE, query),
            AuthUrlKind::Mobile => format!(
                "{}?action=bindcomponent&no_scan=1&{}#wechat_redirect",
                BIND_PAGE_BASE, query
            ),
        }
    }

    async fn load_component_token(&self) -> Result<Option<ComponentToken>, AppError> {
        self.store
            .get::<ComponentToken>(namespaces::COMPONENT_TOKENS, &self.component_appid)
            .await
    }

    async fn load_authorizer(
        &self,
        authorizer_appid: &str,
    ) -> Result<Option<AuthorizationRecord>, AppError> {
        self.store
            .get::<AuthorizationRecord>(namespaces::AUTHORIZERS, authorizer_appid)
            .await
    }
}
