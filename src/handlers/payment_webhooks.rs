use axum::{extract::State, http::HeaderMap, response::Json};
use bytes::Bytes;
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};

use crate::payment_processor::ProcessorChargeStatus;
use crate::services::payments::WebhookAck;
use crate::{errors::ServiceError, AppState};

/// Processor callback event. Only the fields settlement needs are
/// deserialized; everything else in the payload is ignored.
#[derive(Debug, Deserialize)]
struct ProcessorWebhookEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: ProcessorWebhookData,
}

#[derive(Debug, Deserialize)]
struct ProcessorWebhookData {
    object: ProcessorWebhookObject,
}

#[derive(Debug, Deserialize)]
struct ProcessorWebhookObject {
    /// The processor's payment intent identifier.
    id: String,
    #[serde(default)]
    latest_charge: Option<String>,
    #[serde(default)]
    last_payment_error: Option<ProcessorWebhookError>,
}

#[derive(Debug, Deserialize)]
struct ProcessorWebhookError {
    message: String,
}

/// Receive an asynchronous payment outcome from the processor
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    summary = "Payment processor webhook",
    description = "Signed callback carrying the final outcome of a payment intent",
    request_body = String,
    responses(
        (status = 200, description = "Webhook accepted", body = WebhookAck),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown payment intent", body = crate::errors::ErrorResponse),
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ServiceError> {
    let payload = std::str::from_utf8(&body)
        .map_err(|_| ServiceError::ValidationError("webhook body is not UTF-8".to_string()))?;

    match &state.webhook_verifier {
        Some(verifier) => {
            let timestamp = header_str(&headers, "x-timestamp")?;
            let signature = header_str(&headers, "x-signature")?;
            verifier.verify(timestamp, payload, signature, Utc::now())?;
        }
        None => {
            // No shared secret configured; only acceptable in development
            warn!("Accepting payment webhook without signature verification");
        }
    }

    let event: ProcessorWebhookEvent = serde_json::from_str(payload)
        .map_err(|e| ServiceError::ValidationError(format!("invalid webhook payload: {}", e)))?;

    let intent_id = event.data.object.id.as_str();
    match event.event_type.as_str() {
        "payment_intent.succeeded" => {
            // Some processors omit the charge id from the event; fall back
            // to the intent id as the traceable reference
            let charge_id = event
                .data
                .object
                .latest_charge
                .as_deref()
                .unwrap_or(intent_id);
            let ack = state
                .services
                .payments
                .record_processor_outcome(intent_id, ProcessorChargeStatus::Succeeded, charge_id, None)
                .await?;
            Ok(Json(ack))
        }
        "payment_intent.payment_failed" => {
            let reason = event
                .data
                .object
                .last_payment_error
                .map(|e| e.message);
            let ack = state
                .services
                .payments
                .record_processor_outcome(intent_id, ProcessorChargeStatus::Failed, intent_id, reason)
                .await?;
            Ok(Json(ack))
        }
        other => {
            info!(event_id = %event.id, event_type = %other, "Ignoring unhandled webhook type");
            Ok(Json(WebhookAck {
                received: true,
                duplicate: false,
            }))
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, ServiceError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServiceError::Unauthorized(format!("missing {} header", name)))
}
