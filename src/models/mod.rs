//! Credential records stored in the CredentialStore.

mod credentials;

pub use credentials::{
    AuthCodeMapping, AuthUrl, AuthorizationRecord, ComponentToken, CredentialRecord, Registration,
    Ticket,
};
