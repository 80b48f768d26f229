// SPDX-License-Identifier: MIT

//! Inbound webhook verification and dispatch.
//!
//! Pipeline: signature check → body read → XML parse → (optional) envelope
//! decrypt + re-parse → event dispatch. Any failure aborts the whole
//! delivery; nothing partial is dispatched.

use crate::error::AppError;
use crate::models::Ticket;
use crate::services::crypto::{sorted_signature, MessageCryptor};
use crate::services::ticket_ring::TicketRing;
use crate::xml::parse_message;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value};

/// Raw event bodies beyond this are rejected outright.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Query parameters on webhook deliveries.
#[derive(Debug, Default, Deserialize)]
pub struct VerifyQuery {
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub msg_signature: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub encrypt_type: Option<String>,
    #[serde(default)]
    pub echostr: Option<String>,
}

/// Webhook verifier/decryptor. Pushes verify tickets into the TicketRing;
/// other recognized event kinds are logged no-ops.
#[derive(Clone)]
pub struct WebhookVerifier {
    token: String,
    cryptor: MessageCryptor,
    ring: TicketRing,
    component_appid: String,
}

impl WebhookVerifier {
    pub fn new(
        token: String,
        encoding_aes_key: &str,
        component_appid: String,
        ring: TicketRing,
    ) -> Result<Self, AppError> {
        Ok(Self {
            token,
            cryptor: MessageCryptor::new(encoding_aes_key, &component_appid)?,
            ring,
            component_appid,
        })
    }

    /// GET handshake: validate the plaintext signature and echo `echostr`.
    pub fn verify_echo(&self, query: &VerifyQuery) -> Result<String, AppError> {
        self.check_plaintext_signature(query)?;
        query
            .echostr
            .clone()
            .ok_or_else(|| AppError::Param("echostr is required".to_string()))
    }

    /// POST delivery: verify, decrypt if needed, parse, dispatch.
    ///
    /// Returns the parsed event so the transport can log it; the transport
    /// must still acknowledge promptly to stop upstream redelivery.
    pub async fn handle_event(
        &self,
        query: &VerifyQuery,
        body: &[u8],
    ) -> Result<Map<String, Value>, AppError> {
        let encrypted = query.encrypt_type.as_deref() == Some("aes")
            && query.msg_signature.is_some();

        if !encrypted {
            self.check_plaintext_signature(query)?;
        }

        if body.len() > MAX_BODY_BYTES {
            return Err(AppError::PayloadTooLarge);
        }
        let body = std::str::from_utf8(body)
            .map_err(|e| AppError::MalformedBody(format!("body is not UTF-8: {}", e)))?;

        let mut event = parse_message(body)?;

        if encrypted {
            let block = event
                .get("Encrypt")
                .and_then(Value::as_str)
                .ok_or_else(|| AppError::MalformedBody("missing Encrypt element".to_string()))?;

            let (timestamp, nonce) = self.timestamp_nonce(query)?;
            let expected = sorted_signature(&[&self.token, timestamp, nonce, block]);
            if query.msg_signature.as_deref() != Some(expected.as_str()) {
                return Err(AppError::InvalidSignature);
            }

            let inner_xml = self.cryptor.decrypt(block)?;
            event = parse_message(&inner_xml)?;
        }

        self.dispatch(&event).await?;
        Ok(event)
    }

    async fn dispatch(&self, event: &Map<String, Value>) -> Result<(), AppError> {
        match event.get("InfoType").and_then(Value::as_str) {
            Some("component_verify_ticket") => {
                let ticket = event
                    .get("ComponentVerifyTicket")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        AppError::MalformedBody("missing ComponentVerifyTicket".to_string())
                    })?;

                self.ring
                    .push(
                        &self.component_appid,
                        Ticket {
                            component_verify_ticket: ticket.to_string(),
                            received_at: Utc::now(),
                        },
                    )
                    .await?;
                tracing::info!("Verify ticket stored");
            }
            // Recognized lifecycle notifications; deliberate no-ops.
            Some(kind @ ("authorized" | "unauthorized" | "updateauthorized")) => {
                tracing::info!(kind, "Authorization lifecycle event received");
            }
            other => {
                tracing::debug!(info_type = ?other, "Ignoring unhandled event type");
            }
        }
        Ok(())
    }

    fn check_plaintext_signature(&self, query: &VerifyQuery) -> Result<(), AppError> {
        let (timestamp, nonce) = self.timestamp_nonce(query)?;
        let expected = sorted_signature(&[&self.token, timestamp, nonce]);
        if query.signature.as_deref() != Some(expected.as_str()) {
            return Err(AppError::InvalidSignature);
        }
        Ok(())
    }

    fn timestamp_nonce<'q>(&self, query: &'q VerifyQuery) -> Result<(&'q str, &'q str), AppError> {
        match (query.timestamp.as_deref(), query.nonce.as_deref()) {
            (Some(timestamp), Some(nonce)) => Ok((timestamp, nonce)),
            _ => Err(AppError::Param("timestamp and nonce are required".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CredentialStore;

    const TOKEN: &str = "test_message_token";
    const AES_KEY: &str = "abcdefghijklmnopqrstuvwxyz0123456789ABCDEFG";
    const APPID: &str = "wx_component_test";

    fn verifier() -> (WebhookVerifier, TicketRing) {
        let ring = TicketRing::new(CredentialStore::memory());
        let verifier =
            WebhookVerifier::new(TOKEN.to_string(), AES_KEY, APPID.to_string(), ring.clone())
                .unwrap();
        (verifier, ring)
    }

    fn plaintext_query(timestamp: &str, nonce: &str) -> VerifyQuery {
        VerifyQuery {
            signature: Some(sorted_signature(&[TOKEN, timestamp, nonce])),
            timestamp: Some(timestamp.to_string()),
            nonce: Some(nonce.to_string()),
            ..VerifyQuery::default()
        }
    }

    #[tokio::test]
    async fn plaintext_ticket_event_lands_in_ring() {
        let (verifier, ring) = verifier();

        let body = "<xml>\
                    <InfoType>component_verify_ticket</InfoType>\
                    <ComponentVerifyTicket>ticket@@@1</ComponentVerifyTicket>\
                    </xml>";
        let event = verifier
            .handle_event(&plaintext_query("123", "n1"), body.as_bytes())
            .await
            .unwrap();

        assert_eq!(event["InfoType"], "component_verify_ticket");
        let tickets = ring.list(APPID).await.unwrap();
        assert_eq!(tickets.len(), 1);
        assert_eq!(tickets[0].component_verify_ticket, "ticket@@@1");
    }

    #[tokio::test]
    async fn bad_signature_rejected_before_parsing() {
        let (verifier, ring) = verifier();

        let query = VerifyQuery {
            signature: Some("definitely-wrong".to_string()),
            timestamp: Some("123".to_string()),
            nonce: Some("n1".to_string()),
            ..VerifyQuery::default()
        };
        // Body is garbage: it must never be reached.
        let err = verifier
            .handle_event(&query, b"<<<not-xml>>>")
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidSignature));
        assert!(ring.list(APPID).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn encrypted_roundtrip_dispatches_ticket() {
        let (verifier, ring) = verifier();
        let cryptor = MessageCryptor::new(AES_KEY, APPID).unwrap();

        let inner = "<xml>\
                     <AppId>wx_component_test</AppId>\
                     <InfoType>component_verify_ticket</InfoType>\
                     <ComponentVerifyTicket><![CDATA[ticket@@@enc]]></ComponentVerifyTicket>\
                     </xml>";
        let block = cryptor.encrypt(inner).unwrap();
        let body = format!("<xml><Encrypt><![CDATA[{}]]></Encrypt></xml>", block);

        let query = VerifyQuery {
            msg_signature: Some(sorted_signature(&[TOKEN, "456", "n2", &block])),
            timestamp: Some("456".to_string()),
            nonce: Some("n2".to_string()),
            encrypt_type: Some("aes".to_string()),
            ..VerifyQuery::default()
        };

        let event = verifier.handle_event(&query, body.as_bytes()).await.unwrap();
        assert_eq!(event["InfoType"], "component_verify_ticket");
        assert_eq!(event["AppId"], "wx_component_test");

        let tickets = ring.list(APPID).await.unwrap();
        assert_eq!(tickets[0].component_verify_ticket, "ticket@@@enc");
    }

    #[tokio::test]
    async fn encrypted_with_bad_msg_signature_rejected() {
        let (verifier, _) = verifier();
        let cryptor = MessageCryptor::new(AES_KEY, APPID).unwrap();

        let block = cryptor.encrypt("<xml><InfoType>authorized</InfoType></xml>").unwrap();
        let body = format!("<xml><Encrypt>{}</Encrypt></xml>", block);

        let query = VerifyQuery {
            msg_signature: Some("tampered".to_string()),
            timestamp: Some("456".to_string()),
            nonce: Some("n2".to_string()),
            encrypt_type: Some("aes".to_string()),
            ..VerifyQuery::default()
        };

        let err = verifier.handle_event(&query, body.as_bytes()).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidSignature));
    }

    #[tokio::test]
    async fn oversized_body_rejected() {
        let (verifier, _) = verifier();

        let body = vec![b'a'; MAX_BODY_BYTES + 1];
        let err = verifier
            .handle_event(&plaintext_query("1", "n"), &body)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PayloadTooLarge));
    }

    #[tokio::test]
    async fn lifecycle_events_are_noops() {
        let (verifier, ring) = verifier();

        for kind in ["authorized", "unauthorized", "updateauthorized", "newkind"] {
            let body = format!("<xml><InfoType>{}</InfoType></xml>", kind);
            verifier
                .handle_event(&plaintext_query("9", "n9"), body.as_bytes())
                .await
                .unwrap();
        }
        assert!(ring.list(APPID).await.unwrap().is_empty());
    }

    #[test]
    fn echo_requires_valid_signature() {
        let (verifier, _) = verifier();

        let mut query = plaintext_query("777", "n7");
        query.echostr = Some("echo-me".to_string());
        assert_eq!(verifier.verify_echo(&query).unwrap(), "echo-me");

        query.signature = Some("wrong".to_string());
        assert!(matches!(
            verifier.verify_echo(&query).unwrap_err(),
            AppError::InvalidSignature
        ));
    }
}
