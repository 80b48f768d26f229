//! Credential storage layer: a two-level (namespace, key) → JSON-blob store
//! with a pluggable backend.

mod firestore;
mod memory;

pub use firestore::FirestoreStore;
pub use memory::MemoryStore;

use crate::error::AppError;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Namespace names as constants.
pub mod namespaces {
    /// Direct-account token records (keyed by appid)
    pub const DIRECT_TOKENS: &str = "direct_tokens";
    /// Account registrations (appid → secret of record)
    pub const REGISTRATIONS: &str = "registrations";
    /// Platform-level component tokens (keyed by component appid)
    pub const COMPONENT_TOKENS: &str = "component_tokens";
    /// Verify-ticket history (keyed by component appid)
    pub const COMPONENT_TICKETS: &str = "component_tickets";
    /// auth_code → authorizer appid mappings
    pub const AUTH_CODES: &str = "auth_codes";
    /// Authorization records (keyed by authorizer appid)
    pub const AUTHORIZERS: &str = "authorizers";
}

/// Two-level key-value store for credential records.
///
/// Values are opaque structured records; callers pick the concrete type at
/// each call site. Backend failures surface as [`AppError::StoreUnavailable`]
/// with no retry at this layer — a write that fails is a failure, it never
/// degrades to silent success.
#[derive(Clone)]
pub struct CredentialStore {
    backend: Backend,
}

#[derive(Clone)]
enum Backend {
    Memory(MemoryStore),
    Firestore(FirestoreStore),
}

impl CredentialStore {
    /// In-process map backend, no persistence.
    pub fn memory() -> Self {
        Self {
            backend: Backend::Memory(MemoryStore::new()),
        }
    }

    /// Durable Firestore backend.
    pub async fn firestore(project_id: &str) -> Result<Self, AppError> {
        Ok(Self {
            backend: Backend::Firestore(FirestoreStore::new(project_id).await?),
        })
    }

    /// Fetch the record at (namespace, key), if any.
    pub async fn get<T: DeserializeOwned>(
        &self,
        namespace: &str,
        key: &str,
    ) -> Result<Option<T>, AppError> {
        let value = match &self.backend {
            Backend::Memory(store) => store.get(namespace, key),
            Backend::Firestore(store) => store.get(namespace, key).await?,
        };

        match value {
            None => Ok(None),
            Some(value) => serde_json::from_value(value).map(Some).map_err(|e| {
                AppError::StoreUnavailable(format!(
                    "corrupt record at {}/{}: {}",
                    namespace, key, e
                ))
            }),
        }
    }

    /// Store the record at (namespace, key), replacing any prior value.
    pub async fn set<T: Serialize>(
        &self,
        namespace: &str,
        key: &str,
        value: &T,
    ) -> Result<(), AppError> {
        let value = serde_json::to_value(value)
            .map_err(|e| AppError::StoreUnavailable(format!("unserializable record: {}", e)))?;

        match &self.backend {
            Backend::Memory(store) => {
                store.set(namespace, key, value);
                Ok(())
            }
            Backend::Firestore(store) => store.set(namespace, key, value).await,
        }
    }
}
