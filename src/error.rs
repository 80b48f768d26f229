// SPDX-License-Identifier: MIT

//! Application error types with stable error codes and consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
///
/// Every variant carries a stable numeric code (see [`AppError::code`]) so
/// callers can switch on failures without parsing messages.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid parameter: {0}")]
    Param(String),

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Upstream rejected request: errcode={code}, errmsg={message}")]
    UpstreamRejected { code: i64, message: String },

    #[error("No verify ticket available")]
    NoTicketAvailable,

    #[error("Component token issuance failed for all cached tickets")]
    TicketIssuanceFailed,

    #[error("Unknown authorizer: {0}")]
    UnknownAuthorizer(String),

    #[error("Authorization query returned no authorization_info")]
    AuthQueryFailed,

    #[error("Pre-auth code creation returned no pre_auth_code")]
    PreauthCodeFailed,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Decrypted payload failed integrity check: {0}")]
    DecryptIntegrity(String),

    #[error("Payload too large")]
    PayloadTooLarge,

    #[error("Malformed body: {0}")]
    MalformedBody(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl AppError {
    /// Stable numeric error code for API responses.
    pub fn code(&self) -> i64 {
        match self {
            AppError::UpstreamUnavailable(_) => 40000,
            AppError::UpstreamRejected { .. } => 40001,
            AppError::Param(_) => 40003,
            AppError::UnknownAuthorizer(_) => 40004,
            AppError::StoreUnavailable(_) => 40006,
            AppError::MissingCredentials(_) => 40008,
            AppError::NoTicketAvailable => 42001,
            AppError::TicketIssuanceFailed => 42002,
            AppError::AuthQueryFailed => 42003,
            AppError::PreauthCodeFailed => 42004,
            AppError::InvalidSignature => 42101,
            AppError::DecryptIntegrity(_) => 42102,
            AppError::PayloadTooLarge => 42103,
            AppError::MalformedBody(_) => 42104,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Param(_)
            | AppError::MissingCredentials(_)
            | AppError::MalformedBody(_)
            | AppError::DecryptIntegrity(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidSignature => StatusCode::UNAUTHORIZED,
            AppError::UnknownAuthorizer(_) => StatusCode::NOT_FOUND,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::NoTicketAvailable => StatusCode::SERVICE_UNAVAILABLE,
            AppError::UpstreamUnavailable(_)
            | AppError::UpstreamRejected { .. }
            | AppError::TicketIssuanceFailed
            | AppError::AuthQueryFailed
            | AppError::PreauthCodeFailed => StatusCode::BAD_GATEWAY,
            AppError::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON error response body, vendor field names.
#[derive(Serialize)]
struct ErrorResponse {
    errcode: i64,
    errmsg: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Internal detail stays in the logs, not in 5xx bodies.
        let errmsg = match &self {
            AppError::StoreUnavailable(msg) => {
                tracing::error!(error = %msg, "Store error");
                "store unavailable".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorResponse {
            errcode: self.code(),
            errmsg,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(AppError::UpstreamUnavailable("x".into()).code(), 40000);
        assert_eq!(
            AppError::UpstreamRejected {
                code: 40013,
                message: "invalid appid".into()
            }
            .code(),
            40001
        );
        assert_eq!(AppError::Param("x".into()).code(), 40003);
        assert_eq!(AppError::UnknownAuthorizer("wx".into()).code(), 40004);
        assert_eq!(AppError::StoreUnavailable("x".into()).code(), 40006);
        assert_eq!(AppError::MissingCredentials("x".into()).code(), 40008);
        assert_eq!(AppError::NoTicketAvailable.code(), 42001);
        assert_eq!(AppError::TicketIssuanceFailed.code(), 42002);
        assert_eq!(AppError::AuthQueryFailed.code(), 42003);
        assert_eq!(AppError::PreauthCodeFailed.code(), 42004);
        assert_eq!(AppError::InvalidSignature.code(), 42101);
        assert_eq!(AppError::DecryptIntegrity("x".into()).code(), 42102);
        assert_eq!(AppError::PayloadTooLarge.code(), 42103);
        assert_eq!(AppError::MalformedBody("x".into()).code(), 42104);
    }

    #[test]
    fn signature_failure_maps_to_unauthorized() {
        assert_eq!(AppError::InvalidSignature.status(), StatusCode::UNAUTHORIZED);
    }
}
