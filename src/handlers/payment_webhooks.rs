use axum::{extract::State, http::HeaderMap, http::StatusCode, response::IntoResponse};
use bytes::Bytes;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    services::reconciliation::PaymentNotification,
    AppState,
};

type HmacSha256 = Hmac<Sha256>;

/// Gateway notification envelope. Only the fields the reconciler needs are
/// modelled; everything else in the delivery is ignored.
#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type")]
    event_type: String,
    data: WebhookData,
}

#[derive(Debug, Deserialize)]
struct WebhookData {
    object: IntentObject,
}

#[derive(Debug, Deserialize)]
struct IntentObject {
    id: String,
    status: String,
    amount: Decimal,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    payment_method_type: Option<String>,
    #[serde(default)]
    metadata: IntentMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct IntentMetadata {
    #[serde(default)]
    invoice_id: Option<Uuid>,
    #[serde(default)]
    payment_type: Option<String>,
}

// POST /api/v1/payments/webhook
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Notification processed, deduplicated, or ignored"),
        (status = 401, description = "Invalid signature"),
        (status = 400, description = "Invalid payload")
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    // Verify signature if configured
    if let Some(secret) = state.config.payment_webhook_secret.clone() {
        let ok = verify_signature(&headers, &body, &secret, state.config.webhook_tolerance_secs());
        if !ok {
            warn!("Payment webhook signature verification failed");
            return Err(ServiceError::Unauthorized(
                "invalid webhook signature".to_string(),
            ));
        }
    }

    let envelope: WebhookEnvelope = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::BadRequest(format!("invalid webhook payload: {}", e)))?;
    info!(
        event_id = envelope.id.as_deref().unwrap_or("-"),
        event_type = %envelope.event_type,
        "Payment webhook received"
    );

    let object = envelope.data.object;
    let Some(invoice_id) = object.metadata.invoice_id else {
        // Nothing to reconcile against; ack so the gateway stops retrying.
        warn!(intent_id = %object.id, "Payment webhook metadata carries no invoice id");
        return Ok((StatusCode::OK, "ok"));
    };

    let outcome = state
        .services
        .reconciliation
        .handle_notification(PaymentNotification {
            intent_id: object.id,
            status: object.status,
            amount: object.amount,
            currency: object.currency,
            method: object.payment_method_type,
            invoice_id,
        })
        .await?;
    debug!(?outcome, "Payment webhook processed");

    Ok((StatusCode::OK, "ok"))
}

fn verify_signature(headers: &HeaderMap, payload: &Bytes, secret: &str, tolerance_secs: u64) -> bool {
    // Generic HMAC: x-timestamp and x-signature headers
    if let (Some(ts), Some(sig)) = (headers.get("x-timestamp"), headers.get("x-signature")) {
        if let (Ok(ts), Ok(sig)) = (ts.to_str(), sig.to_str()) {
            if let Ok(ts_i) = ts.parse::<i64>() {
                let now = chrono::Utc::now().timestamp();
                if (now - ts_i).unsigned_abs() > tolerance_secs {
                    return false;
                }
            }
            return signature_matches(secret, ts, payload, sig);
        }
    }
    // Stripe-like support: Stripe-Signature with t=, v1=
    if let Some(sig) = headers.get("Stripe-Signature").and_then(|h| h.to_str().ok()) {
        let mut ts = "";
        let mut v1 = "";
        for part in sig.split(',') {
            let mut it = part.split('=');
            match (it.next(), it.next()) {
                (Some("t"), Some(val)) => ts = val,
                (Some("v1"), Some(val)) => v1 = val,
                _ => {}
            }
        }
        if !ts.is_empty() && !v1.is_empty() {
            if let Ok(ts_i) = ts.parse::<i64>() {
                let now = chrono::Utc::now().timestamp();
                if (now - ts_i).unsigned_abs() > tolerance_secs {
                    return false;
                }
            }
            return signature_matches(secret, ts, payload, v1);
        }
    }
    false
}

fn signature_matches(secret: &str, timestamp: &str, payload: &Bytes, provided: &str) -> bool {
    let signed = format!(
        "{}.{}",
        timestamp,
        std::str::from_utf8(payload).unwrap_or("")
    );
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(signed.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());
    constant_time_eq(&expected, provided)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}
