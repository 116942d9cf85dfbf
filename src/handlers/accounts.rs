use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use uuid::Uuid;

use crate::services::promotion::{AccountResponse, PromoteRequest, PromoteResponse};
use crate::{errors::ServiceError, ApiResponse, AppState};

/// Promote a guest identity into an account
#[utoipa::path(
    post,
    path = "/api/v1/accounts/promote",
    summary = "Promote guest to account",
    description = "Create an account from the guest identity behind an access token and relink its bookings. Safe to retry; a partial earlier attempt is resumed.",
    request_body = PromoteRequest,
    responses(
        (status = 201, description = "Account created or promotion resumed", body = ApiResponse<PromoteResponse>),
        (status = 400, description = "Invalid credentials", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown token", body = crate::errors::ErrorResponse),
        (status = 409, description = "Email already registered to someone else", body = crate::errors::ErrorResponse),
        (status = 410, description = "Token expired", body = crate::errors::ErrorResponse),
    ),
    tag = "Accounts"
)]
pub async fn promote_guest(
    State(state): State<AppState>,
    Json(request): Json<PromoteRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PromoteResponse>>), ServiceError> {
    let response = state.services.promotion.promote(request).await?;
    let status = if response.already_promoted {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(ApiResponse::success(response))))
}

/// Get an account by ID (staff)
#[utoipa::path(
    get,
    path = "/api/v1/accounts/{id}",
    summary = "Get account",
    params(("id" = Uuid, Path, description = "Account ID")),
    responses(
        (status = 200, description = "Account found", body = ApiResponse<AccountResponse>),
        (status = 404, description = "Account not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Accounts"
)]
pub async fn get_account(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<AccountResponse>>, ServiceError> {
    let response = state.services.promotion.get_account(id).await?;
    Ok(Json(ApiResponse::success(response)))
}
