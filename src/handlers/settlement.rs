use axum::{
    extract::{Path, State},
    response::Json,
    Extension,
};
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::services::bookings::BookingResponse;
use crate::services::settlement::{RejectPaymentRequest, SettlementResponse};
use crate::{errors::ServiceError, ApiResponse, AppState};

/// Confirm a manual cash or bank payment
#[utoipa::path(
    post,
    path = "/api/v1/bookings/{id}/confirm-payment",
    summary = "Confirm manual payment",
    description = "Driver confirms the rider settled in cash or by bank transfer; settles the booking and writes the fare split",
    params(("id" = Uuid, Path, description = "Booking ID")),
    responses(
        (status = 200, description = "Payment confirmed and settled", body = ApiResponse<SettlementResponse>),
        (status = 400, description = "Booking is not manually settled", body = crate::errors::ErrorResponse),
        (status = 404, description = "Booking not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Booking is not awaiting payment", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Settlement"
)]
pub async fn confirm_payment(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<SettlementResponse>>, ServiceError> {
    let response = state.services.settlement.confirm_payment(id).await?;
    info!(booking_id = %id, confirmed_by = %auth_user.user_id, "Manual payment confirmed");
    Ok(Json(ApiResponse::success(response)))
}

/// Reject a manual cash or bank payment
#[utoipa::path(
    post,
    path = "/api/v1/bookings/{id}/reject-payment",
    summary = "Reject manual payment",
    description = "Driver records that the rider did not pay; requires a reason",
    params(("id" = Uuid, Path, description = "Booking ID")),
    request_body = RejectPaymentRequest,
    responses(
        (status = 200, description = "Payment rejected", body = ApiResponse<BookingResponse>),
        (status = 400, description = "Missing rejection reason", body = crate::errors::ErrorResponse),
        (status = 404, description = "Booking not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Booking is not awaiting payment", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Settlement"
)]
pub async fn reject_payment(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(request): Json<RejectPaymentRequest>,
) -> Result<Json<ApiResponse<BookingResponse>>, ServiceError> {
    let response = state.services.settlement.reject_payment(id, request).await?;
    info!(booking_id = %id, rejected_by = %auth_user.user_id, "Manual payment rejected");
    Ok(Json(ApiResponse::success(response)))
}

/// Get the settlement record for a booking
#[utoipa::path(
    get,
    path = "/api/v1/bookings/{id}/settlement",
    summary = "Get settlement",
    description = "Transaction and per-recipient fare split for a settled booking",
    params(("id" = Uuid, Path, description = "Booking ID")),
    responses(
        (status = 200, description = "Settlement found", body = ApiResponse<SettlementResponse>),
        (status = 404, description = "No settlement for this booking", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Settlement"
)]
pub async fn get_settlement(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<SettlementResponse>>, ServiceError> {
    let response = state.services.settlement.get_settlement(id).await?;
    Ok(Json(ApiResponse::success(response)))
}
