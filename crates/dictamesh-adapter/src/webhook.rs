//! Webhook sync mode.
//!
//! The raw request body is captured *before* JSON parsing so the HMAC is
//! computed over the exact bytes the sender signed; a handler must never
//! re-encode the parsed payload and verify against that instead.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use dictamesh_connector::Record;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{info, warn};
use uuid::Uuid;

use crate::runtime::Adapter;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-dictamesh-signature";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventKind {
    Created,
    Updated,
    Deleted,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    pub event_id: Uuid,
    pub kind: WebhookEventKind,
    pub entity_type: String,
    pub record: Record,
}

/// Verifies `body` against `signature_hex` (lowercase hex HMAC-SHA256)
/// using `secret`. Constant-time by virtue of `hmac`'s `verify_slice`.
pub fn verify_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// `axum` handler mounted at the adapter's configured webhook path.
/// Returns `401` on a missing or invalid signature; otherwise always
/// `200`, including for payloads that fail to parse or name an unknown
/// event kind (spec: "Unknown event kinds are ignored with a log"), since
/// the sender has no useful recovery action for those.
pub async fn handle(
    State(adapter): State<Arc<Adapter>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let Some(secret) = adapter.webhook_secret() else {
        warn!("webhook received but adapter has no configured secret, rejecting");
        return StatusCode::UNAUTHORIZED;
    };

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !verify_signature(&secret, &body, signature) {
        warn!("webhook signature verification failed");
        return StatusCode::UNAUTHORIZED;
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "webhook body failed to parse, dropping");
            return StatusCode::OK;
        }
    };

    if adapter.webhook_already_processed(payload.event_id) {
        info!(event_id = %payload.event_id, "webhook event already processed, no-op");
        return StatusCode::OK;
    }

    match payload.kind {
        WebhookEventKind::Created | WebhookEventKind::Updated => {
            if let Err(err) = adapter.idempotent_upsert(&payload.entity_type, &payload.record).await {
                warn!(error = %err, event_id = %payload.event_id, "webhook upsert failed");
            }
        }
        WebhookEventKind::Deleted => {
            if let Err(err) = adapter.delete_by_source_id(&payload.entity_type, &payload.record.id).await {
                warn!(error = %err, event_id = %payload.event_id, "webhook delete failed");
            }
        }
        WebhookEventKind::Unknown => {
            warn!(event_id = %payload.event_id, "unknown webhook event kind, ignoring");
            return StatusCode::OK;
        }
    }

    adapter.webhook_mark_processed(payload.event_id);
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_signature_accepts_matching_hmac() {
        let secret = "shh";
        let body = b"{\"a\":1}";
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let signature = hex::encode(mac.finalize().into_bytes());
        assert!(verify_signature(secret, body, &signature));
    }

    #[test]
    fn verify_signature_rejects_tampered_body() {
        let secret = "shh";
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(b"{\"a\":1}");
        let signature = hex::encode(mac.finalize().into_bytes());
        assert!(!verify_signature(secret, b"{\"a\":2}", &signature));
    }

    #[test]
    fn verify_signature_rejects_malformed_hex() {
        assert!(!verify_signature("shh", b"body", "not-hex"));
    }
}
