// SPDX-License-Identifier: MIT

//! WeChat API client for token issuance and the open-platform component flow.
//!
//! Handles:
//! - Direct-account token issuance
//! - Component token issuance from verify tickets
//! - Pre-authorization codes, auth-code queries, authorizer-token refresh
//! - errcode/errmsg mapping and bounded request timeouts

use crate::error::AppError;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

/// Upstream calls suspend at the network; keep them bounded.
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(5);

/// WeChat API client.
#[derive(Clone)]
pub struct WechatClient {
    http: reqwest::Client,
    base_url: String,
}

impl WechatClient {
    /// Create a client against the given API base URL
    /// (`https://api.weixin.qq.com` in production, a mock server in tests).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Issue a direct-account access token from (appid, secret).
    pub async fn direct_token(&self, appid: &str, secret: &str) -> Result<TokenResponse, AppError> {
        let url = format!("{}/cgi-bin/token", self.base_url);
        let response = self
            .http
            .get(&url)
            .timeout(UPSTREAM_TIMEOUT)
            .query(&[
                ("grant_type", "client_credential"),
                ("appid", appid),
                ("secret", secret),
            ])
            .send()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(e.to_string()))?;

        parse_checked(self.read_value(response).await?)
    }

    /// Mint a component access token from a verify ticket.
    ///
    /// A vendor rejection (errcode, or a body without the token) returns
    /// `Ok(None)` so the caller can fall back to the previous ticket; only
    /// transport failures are errors.
    pub async fn component_token(
        &self,
        component_appid: &str,
        component_appsecret: &str,
        verify_ticket: &str,
    ) -> Result<Option<ComponentTokenResponse>, AppError> {
        let value = self
            .post(
                "/cgi-bin/component/api_component_token",
                &[],
                &json!({
                    "component_appid": component_appid,
                    "component_appsecret": component_appsecret,
                    "component_verify_ticket": verify_ticket,
                }),
            )
            .await?;

        if let Some(code) = rejection_code(&value) {
            tracing::warn!(
                errcode = code,
                errmsg = value["errmsg"].as_str().unwrap_or(""),
                "Component token issuance rejected"
            );
            return Ok(None);
        }

        match serde_json::from_value::<ComponentTokenResponse>(value) {
            Ok(token) if !token.component_access_token.is_empty() => Ok(Some(token)),
            _ => Ok(None),
        }
    }

    /// Create a pre-authorization code.
    pub async fn create_preauthcode(
        &self,
        component_access_token: &str,
        component_appid: &str,
    ) -> Result<PreauthCodeResponse, AppError> {
        let value = self
            .post(
                "/cgi-bin/component/api_create_preauthcode",
                &[("component_access_token", component_access_token)],
                &json!({ "component_appid": component_appid }),
            )
            .await?;
        parse_checked(value)
    }

    /// Exchange a one-time authorization code for authorization info.
    pub async fn query_auth(
        &self,
        component_access_token: &str,
        component_appid: &str,
        authorization_code: &str,
    ) -> Result<QueryAuthResponse, AppError> {
        let value = self
            .post(
                "/cgi-bin/component/api_query_auth",
                &[("component_access_token", component_access_token)],
                &json!({
                    "component_appid": component_appid,
                    "authorization_code": authorization_code,
                }),
            )
            .await?;
        parse_checked(value)
    }

    /// Refresh an authorizer's access token.
    pub async fn authorizer_token(
        &self,
        component_access_token: &str,
        component_appid: &str,
        authorizer_appid: &str,
        authorizer_refresh_token: &str,
    ) -> Result<AuthorizerTokenResponse, AppError> {
        let value = self
            .post(
                "/cgi-bin/component/api_authorizer_token",
                &[("component_access_token", component_access_token)],
                &json!({
                    "component_appid": component_appid,
                    "authorizer_appid": authorizer_appid,
                    "authorizer_refresh_token": authorizer_refresh_token,
                }),
            )
            .await?;
        parse_checked(value)
    }

    async fn post(
        &self,
        path: &str,
        query: &[(&str, &str)],
        body: &Value,
    ) -> Result<Value, AppError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .timeout(UPSTREAM_TIMEOUT)
            .query(query)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(e.to_string()))?;

        self.read_value(response).await
    }

    async fn read_value(&self, response: reqwest::Response) -> Result<Value, AppError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::UpstreamUnavailable(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("JSON parse error: {}", e)))
    }
}

/// A non-zero errcode, if the body carries one.
fn rejection_code(value: &Value) -> Option<i64> {
    match value.get("errcode").and_then(Value::as_i64) {
        Some(0) | None => None,
        Some(code) => Some(code),
    }
}

/// Check for an application-level rejection, then deserialize.
fn parse_checked<T: DeserializeOwned>(value: Value) -> Result<T, AppError> {
    if let Some(code) = rejection_code(&value) {
        return Err(AppError::UpstreamRejected {
            code,
            message: value["errmsg"].as_str().unwrap_or("").to_string(),
        });
    }
    serde_json::from_value(value)
        .map_err(|e| AppError::UpstreamUnavailable(format!("unexpected response shape: {}", e)))
}

/// Direct-account token issuance response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: i64,
}

/// Component token issuance response.
#[derive(Debug, Clone, Deserialize)]
pub struct ComponentTokenResponse {
    pub component_access_token: String,
    pub expires_in: i64,
}

/// Pre-authorization code response.
#[derive(Debug, Clone, Deserialize)]
pub struct PreauthCodeResponse {
    #[serde(default)]
    pub pre_auth_code: Option<String>,
    #[serde(default)]
    pub expires_in: i64,
}

/// Auth-code query response.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryAuthResponse {
    #[serde(default)]
    pub authorization_info: Option<AuthorizationInfo>,
}

/// The authorization payload inside a query-auth response.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizationInfo {
    pub authorizer_appid: String,
    pub authorizer_access_token: String,
    pub authorizer_refresh_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub func_info: Vec<FuncInfo>,
}

/// One granted scope category.
#[derive(Debug, Clone, Deserialize)]
pub struct FuncInfo {
    pub funcscope_category: FuncScopeCategory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FuncScopeCategory {
    pub id: i64,
}

/// Authorizer-token refresh response. The refresh token may rotate.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizerTokenResponse {
    pub authorizer_access_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub authorizer_refresh_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejection_code_ignores_success_and_absence() {
        assert_eq!(rejection_code(&json!({"errcode": 0, "errmsg": "ok"})), None);
        assert_eq!(rejection_code(&json!({"access_token": "t"})), None);
        assert_eq!(
            rejection_code(&json!({"errcode": 40013, "errmsg": "invalid appid"})),
            Some(40013)
        );
    }

    #[test]
    fn parse_checked_maps_errcode() {
        let err = parse_checked::<TokenResponse>(json!({
            "errcode": 40125,
            "errmsg": "invalid appsecret"
        }))
        .unwrap_err();

        match err {
            AppError::UpstreamRejected { code, message } => {
                assert_eq!(code, 40125);
                assert_eq!(message, "invalid appsecret");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
