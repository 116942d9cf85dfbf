use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use uuid::Uuid;

use crate::services::payments::{ConfirmProcessorPaymentRequest, PaymentIntentResponse};
use crate::services::settlement::SettlementResponse;
use crate::{errors::ServiceError, ApiResponse, AppState};

async fn booking_id_for_token(state: &AppState, token: &str) -> Result<Uuid, ServiceError> {
    let booking = state.services.bookings.get_booking_by_token(token).await?;
    Ok(booking.id)
}

/// Create (or return) the payment intent for a processor-paid booking
#[utoipa::path(
    post,
    path = "/api/v1/bookings/by-token/{token}/payment-intent",
    summary = "Create payment intent",
    description = "Idempotent: repeated calls return the same intent rather than charging twice",
    params(("token" = String, Path, description = "Guest access token")),
    responses(
        (status = 201, description = "Payment intent ready", body = ApiResponse<PaymentIntentResponse>),
        (status = 400, description = "Booking is not processor-paid", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown token", body = crate::errors::ErrorResponse),
        (status = 409, description = "Booking already past payment", body = crate::errors::ErrorResponse),
        (status = 410, description = "Token expired", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment processor unavailable", body = crate::errors::ErrorResponse),
    ),
    tag = "Payments"
)]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<(StatusCode, Json<ApiResponse<PaymentIntentResponse>>), ServiceError> {
    let booking_id = booking_id_for_token(&state, &token).await?;
    let response = state.services.payments.create_intent(booking_id).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(response))))
}

/// Confirm a processor payment server-side
#[utoipa::path(
    post,
    path = "/api/v1/bookings/by-token/{token}/confirm-payment",
    summary = "Confirm processor payment",
    description = "Confirms the booking's payment intent with the processor and settles on success",
    params(("token" = String, Path, description = "Guest access token")),
    request_body = ConfirmProcessorPaymentRequest,
    responses(
        (status = 200, description = "Payment settled", body = ApiResponse<SettlementResponse>),
        (status = 400, description = "No intent or wrong payment method", body = crate::errors::ErrorResponse),
        (status = 402, description = "Payment declined", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown token", body = crate::errors::ErrorResponse),
        (status = 409, description = "Booking already past payment", body = crate::errors::ErrorResponse),
        (status = 410, description = "Token expired", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment processor unavailable", body = crate::errors::ErrorResponse),
    ),
    tag = "Payments"
)]
pub async fn confirm_processor_payment(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(request): Json<ConfirmProcessorPaymentRequest>,
) -> Result<Json<ApiResponse<SettlementResponse>>, ServiceError> {
    let booking_id = booking_id_for_token(&state, &token).await?;
    let response = state
        .services
        .payments
        .confirm_with_processor(booking_id, request)
        .await?;
    Ok(Json(ApiResponse::success(response)))
}
