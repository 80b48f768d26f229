//! Record types for both token flows.
//!
//! Timestamps are RFC 3339 in storage. Freshness is always computed against
//! `updated_at`/`created_at` at read time; nothing here caches a verdict.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Safety margin subtracted from a token's declared TTL (10 minutes).
pub(crate) const TTL_SAFETY_MARGIN_SECS: i64 = 600;

/// Component tokens are refreshed once they are this old, regardless of the
/// declared TTL (typically 120 minutes).
pub(crate) const COMPONENT_TOKEN_MAX_AGE_MINS: i64 = 110;

/// Direct-account token record, one per appid.
///
/// Merged in place on every refresh; never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub appid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    pub access_token: String,
    pub expires_in: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CredentialRecord {
    /// Fresh iff `now < updated_at + expires_in − 600s`.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.updated_at + Duration::seconds(self.expires_in - TTL_SAFETY_MARGIN_SECS)
    }
}

/// Account registration: the secret of record for an appid, plus whatever
/// extra fields the registrant supplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub appid: String,
    pub secret: String,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Platform-level token minted from a verify ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentToken {
    pub component_access_token: String,
    pub expires_in: i64,
    pub created_at: DateTime<Utc>,
}

impl ComponentToken {
    /// Fresh while younger than 110 minutes, independent of `expires_in`.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at < Duration::minutes(COMPONENT_TOKEN_MAX_AGE_MINS)
    }
}

/// One verify ticket as pushed by the vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub component_verify_ticket: String,
    pub received_at: DateTime<Utc>,
}

/// Delegated-authorization record for one authorizer appid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationRecord {
    pub authorizer_appid: String,
    pub authorizer_access_token: String,
    pub authorizer_refresh_token: String,
    pub expires_in: i64,
    /// Granted scope category ids from the vendor's func_info list.
    #[serde(default)]
    pub func_info: Vec<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AuthorizationRecord {
    /// Same freshness window as [`CredentialRecord`].
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.updated_at + Duration::seconds(self.expires_in - TTL_SAFETY_MARGIN_SECS)
    }
}

/// auth_code → authorizer appid. Auth codes are single-use upstream, so this
/// mapping is written once and then only read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthCodeMapping {
    pub authorizer_appid: String,
}

/// Result of building an authorization redirect URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUrl {
    pub url: String,
    pub expires_in: i64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_record_freshness_window() {
        let now = Utc::now();
        let record = CredentialRecord {
            appid: "wx1".into(),
            secret: None,
            access_token: "AT1".into(),
            expires_in: 7200,
            created_at: now,
            updated_at: now,
        };

        // Window closes at updated_at + 7200 − 600 = +6600s.
        assert!(record.is_fresh(now + Duration::seconds(6599)));
        assert!(!record.is_fresh(now + Duration::seconds(6600)));
        assert!(!record.is_fresh(now + Duration::seconds(6601)));
    }

    #[test]
    fn component_token_ignores_declared_ttl() {
        let now = Utc::now();
        let token = ComponentToken {
            component_access_token: "CT".into(),
            expires_in: 7200, // declared 120 min
            created_at: now,
        };

        assert!(token.is_fresh(now + Duration::minutes(109)));
        assert!(!token.is_fresh(now + Duration::minutes(110)));
        assert!(!token.is_fresh(now + Duration::minutes(120)));
    }
}
