use crate::config::AppConfig;
use crate::errors::ServiceError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Request to open a payment intent with the external payment gateway.
///
/// Amounts are in major currency units with two decimal places, matching how
/// they are stored on invoices.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentIntentRequest {
    pub amount: Decimal,
    pub currency: String,
    pub description: String,
    pub metadata: IntentMetadata,
}

/// Metadata attached to every intent so webhook deliveries can be traced back
/// to the invoice they settle.
#[derive(Debug, Clone, Serialize)]
pub struct IntentMetadata {
    pub invoice_id: Uuid,
    pub quote_id: Uuid,
    pub payment_type: String,
}

/// Identifiers the gateway hands back for a created intent. `client_handle`
/// is forwarded to the client application to complete the payment and is
/// never persisted.
#[derive(Debug, Clone)]
pub struct PaymentIntentHandle {
    pub intent_id: String,
    pub client_handle: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("payment gateway request timed out")]
    Timeout,
    #[error("payment gateway rejected the request: {0}")]
    Rejected(String),
    #[error("payment gateway transport error: {0}")]
    Transport(String),
    #[error("unparseable payment gateway response: {0}")]
    InvalidResponse(String),
}

/// Client for the external payment provider. The acceptance flow talks to the
/// gateway through this trait so tests can substitute their own.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment_intent(
        &self,
        request: PaymentIntentRequest,
    ) -> Result<PaymentIntentHandle, GatewayError>;
}

#[derive(Debug, Deserialize)]
struct IntentResponse {
    id: String,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

/// HTTP implementation of [`PaymentGateway`].
#[derive(Clone)]
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpPaymentGateway {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ServiceError::InternalError(format!("Failed to build gateway HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self, ServiceError> {
        Self::new(
            cfg.payment_gateway_base_url.clone(),
            cfg.payment_gateway_api_key.clone(),
            Duration::from_secs(cfg.payment_gateway_timeout_secs),
        )
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(skip(self, request), fields(invoice_id = %request.metadata.invoice_id))]
    async fn create_payment_intent(
        &self,
        request: PaymentIntentRequest,
    ) -> Result<PaymentIntentHandle, GatewayError> {
        let url = format!("{}/v1/payment_intents", self.base_url);

        let mut builder = self.client.post(&url).json(&request);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                warn!("Payment gateway did not respond within the timeout");
                GatewayError::Timeout
            } else {
                error!(error = %e, "Payment gateway request failed");
                GatewayError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(status = %status, error = %error_text, "Payment gateway rejected intent");
            return Err(GatewayError::Rejected(format!(
                "{}: {}",
                status, error_text
            )));
        }

        let intent: IntentResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        info!(
            intent_id = %intent.id,
            status = ?intent.status,
            "Payment intent created"
        );

        Ok(PaymentIntentHandle {
            intent_id: intent.id,
            client_handle: intent.client_secret,
        })
    }
}
