//! Application configuration loaded from environment variables.
//!
//! All values are read once at startup; services receive clones and never
//! consult the environment afterwards.

use std::env;

/// Which CredentialStore backend to construct at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// In-process map, no persistence. Default for local development.
    Memory,
    /// Durable Firestore collections.
    Firestore,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Third-party platform appid (component_appid)
    pub component_appid: String,
    /// Third-party platform secret (component_appsecret)
    pub component_appsecret: String,
    /// Webhook message token used in signature checks
    pub message_token: String,
    /// 43-char encoding key for AES message envelopes
    pub encoding_aes_key: String,
    /// Base URL of the WeChat API (overridable for tests)
    pub api_base_url: String,
    /// Store backend selection
    pub store_backend: StoreBackend,
    /// GCP project ID (Firestore backend only)
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let store_backend = match env::var("STORE_BACKEND").as_deref() {
            Ok("firestore") => StoreBackend::Firestore,
            Ok("memory") | Err(_) => StoreBackend::Memory,
            Ok(other) => return Err(ConfigError::Invalid("STORE_BACKEND", other.to_string())),
        };

        Ok(Self {
            component_appid: env::var("COMPONENT_APPID")
                .map_err(|_| ConfigError::Missing("COMPONENT_APPID"))?,
            component_appsecret: env::var("COMPONENT_APPSECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("COMPONENT_APPSECRET"))?,
            message_token: env::var("MESSAGE_TOKEN")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("MESSAGE_TOKEN"))?,
            encoding_aes_key: env::var("ENCODING_AES_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("ENCODING_AES_KEY"))?,
            api_base_url: env::var("WECHAT_API_BASE_URL")
                .unwrap_or_else(|_| "https://api.weixin.qq.com".to_string()),
            store_backend,
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
        })
    }

    /// Default config for tests only.
    pub fn test_default() -> Self {
        Self {
            component_appid: "wx_component_test".to_string(),
            component_appsecret: "component_secret".to_string(),
            message_token: "test_message_token".to_string(),
            // 43 chars, decodes to 32 bytes
            encoding_aes_key: "abcdefghijklmnopqrstuvwxyz0123456789ABCDEFG".to_string(),
            api_base_url: "http://127.0.0.1:1".to_string(),
            store_backend: StoreBackend::Memory,
            gcp_project_id: "test-project".to_string(),
            port: 8080,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
