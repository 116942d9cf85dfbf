/*!
 * # Payment Processor Client
 *
 * Boundary to the external card processor. The core treats the processor
 * as opaque beyond intent ids, client secrets, and charge status; the
 * trait exists so services can run against a deterministic in-process
 * implementation in tests and in development environments without
 * processor credentials.
 */

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, instrument, warn};

use crate::errors::ServiceError;

/// Charge outcome as reported by the processor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorChargeStatus {
    Succeeded,
    Failed,
}

/// Processor-side handle for an authorized-but-unsettled charge.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorIntent {
    pub id: String,
    pub client_secret: String,
}

/// Result of confirming a charge against an intent.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorCharge {
    pub id: String,
    pub status: ProcessorChargeStatus,
}

#[async_trait]
pub trait PaymentProcessorClient: Send + Sync {
    /// Create a chargeable intent. `idempotency_key` must make a retried
    /// call land on the already-created intent rather than a second one.
    async fn create_payment_intent(
        &self,
        amount: Decimal,
        currency: &str,
        idempotency_key: &str,
        metadata: serde_json::Value,
    ) -> Result<ProcessorIntent, ServiceError>;

    /// Confirm the charge held by `client_secret` with the rider's chosen
    /// payment method.
    async fn confirm_payment(
        &self,
        client_secret: &str,
        payment_method: &str,
    ) -> Result<ProcessorCharge, ServiceError>;
}

#[derive(Serialize)]
struct CreateIntentBody<'a> {
    amount: i64,
    currency: &'a str,
    metadata: serde_json::Value,
}

#[derive(Serialize)]
struct ConfirmBody<'a> {
    client_secret: &'a str,
    payment_method: &'a str,
}

/// Processor amounts are integers in the currency's minor unit.
fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    (amount * Decimal::from(100))
        .round()
        .to_i64()
        .ok_or_else(|| {
            ServiceError::ValidationError(format!("amount {} not representable in minor units", amount))
        })
}

/// HTTP client against the real processor API.
#[derive(Clone)]
pub struct HttpPaymentProcessor {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpPaymentProcessor {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ServiceError::InternalError(format!("failed to build processor http client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn handle_error_response(
        &self,
        response: reqwest::Response,
    ) -> ServiceError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::PAYMENT_REQUIRED {
            warn!(status = %status, "Processor declined the charge");
            PaymentDeclineDetail::from_body(&body).into_error()
        } else {
            error!(status = %status, body = %body, "Processor request failed");
            ServiceError::ExternalServiceError(format!(
                "payment processor returned {}",
                status
            ))
        }
    }
}

#[derive(Deserialize)]
struct PaymentDeclineDetail {
    error: Option<DeclineError>,
}

#[derive(Deserialize)]
struct DeclineError {
    message: String,
}

impl PaymentDeclineDetail {
    fn from_body(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or(Self { error: None })
    }

    fn into_error(self) -> ServiceError {
        ServiceError::PaymentFailed(
            self.error
                .map(|e| e.message)
                .unwrap_or_else(|| "charge declined".to_string()),
        )
    }
}

#[async_trait]
impl PaymentProcessorClient for HttpPaymentProcessor {
    #[instrument(skip(self, metadata), fields(idempotency_key = %idempotency_key))]
    async fn create_payment_intent(
        &self,
        amount: Decimal,
        currency: &str,
        idempotency_key: &str,
        metadata: serde_json::Value,
    ) -> Result<ProcessorIntent, ServiceError> {
        let body = CreateIntentBody {
            amount: to_minor_units(amount)?,
            currency,
            metadata,
        };

        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.base_url))
            .bearer_auth(&self.api_key)
            .header("Idempotency-Key", idempotency_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Processor intent request did not complete");
                ServiceError::ExternalServiceError(format!("payment processor unreachable: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(self.handle_error_response(response).await);
        }

        response.json::<ProcessorIntent>().await.map_err(|e| {
            error!(error = %e, "Processor intent response did not parse");
            ServiceError::ExternalServiceError(format!("malformed processor response: {}", e))
        })
    }

    #[instrument(skip(self, client_secret, payment_method))]
    async fn confirm_payment(
        &self,
        client_secret: &str,
        payment_method: &str,
    ) -> Result<ProcessorCharge, ServiceError> {
        let body = ConfirmBody {
            client_secret,
            payment_method,
        };

        let response = self
            .client
            .post(format!("{}/v1/payment_intents/confirm", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Processor confirm request did not complete");
                ServiceError::ExternalServiceError(format!("payment processor unreachable: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(self.handle_error_response(response).await);
        }

        response.json::<ProcessorCharge>().await.map_err(|e| {
            error!(error = %e, "Processor confirm response did not parse");
            ServiceError::ExternalServiceError(format!("malformed processor response: {}", e))
        })
    }
}

/// Payment method token that the static processor declines, mirroring the
/// processor sandbox's decline test card.
pub const STATIC_DECLINE_METHOD: &str = "pm_card_declined";

/// Deterministic in-process processor for development and tests. The same
/// idempotency key always yields the same intent, and every confirmation
/// succeeds unless [`STATIC_DECLINE_METHOD`] is used.
#[derive(Clone, Copy, Debug, Default)]
pub struct StaticPaymentProcessor;

#[async_trait]
impl PaymentProcessorClient for StaticPaymentProcessor {
    async fn create_payment_intent(
        &self,
        amount: Decimal,
        _currency: &str,
        idempotency_key: &str,
        _metadata: serde_json::Value,
    ) -> Result<ProcessorIntent, ServiceError> {
        // Validates the same way the real processor would
        to_minor_units(amount)?;
        Ok(ProcessorIntent {
            id: format!("pi_static_{}", idempotency_key),
            client_secret: format!("pi_static_{}_secret", idempotency_key),
        })
    }

    async fn confirm_payment(
        &self,
        client_secret: &str,
        payment_method: &str,
    ) -> Result<ProcessorCharge, ServiceError> {
        let id = client_secret.trim_end_matches("_secret").to_string();
        if payment_method == STATIC_DECLINE_METHOD {
            return Ok(ProcessorCharge {
                id,
                status: ProcessorChargeStatus::Failed,
            });
        }
        Ok(ProcessorCharge {
            id,
            status: ProcessorChargeStatus::Succeeded,
        })
    }
}

/// Verifies `HMAC-SHA256(secret, "{timestamp}.{body}")` signatures on
/// processor callbacks, with a bounded timestamp tolerance against replay.
pub struct WebhookVerifier {
    secret: String,
    tolerance: chrono::Duration,
}

impl WebhookVerifier {
    pub fn new(secret: String, tolerance_secs: i64) -> Self {
        Self {
            secret,
            tolerance: chrono::Duration::seconds(tolerance_secs),
        }
    }

    pub fn verify(
        &self,
        timestamp: &str,
        body: &str,
        signature_hex: &str,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), ServiceError> {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        type HmacSha256 = Hmac<Sha256>;

        let sent_at = timestamp
            .parse::<i64>()
            .ok()
            .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
            .ok_or_else(|| {
                ServiceError::Unauthorized("webhook timestamp is not a unix epoch".to_string())
            })?;

        let age = now.signed_duration_since(sent_at);
        if age > self.tolerance || age < -self.tolerance {
            return Err(ServiceError::Unauthorized(
                "webhook timestamp outside tolerance".to_string(),
            ));
        }

        let signature = hex::decode(signature_hex).map_err(|_| {
            ServiceError::Unauthorized("webhook signature is not hex".to_string())
        })?;

        let signed_payload = format!("{}.{}", timestamp, body);
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| ServiceError::InternalError("webhook secret unusable".to_string()))?;
        mac.update(signed_payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| ServiceError::Unauthorized("webhook signature mismatch".to_string()))
    }

    /// Signing side of the same scheme; used by tests and by the processor
    /// simulator to produce valid callbacks.
    pub fn sign(&self, timestamp: &str, body: &str) -> String {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        type HmacSha256 = Hmac<Sha256>;

        let signed_payload = format!("{}.{}", timestamp, body);
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signed_payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}
