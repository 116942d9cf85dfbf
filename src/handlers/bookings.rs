use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::BookingRef;
use crate::services::bookings::{
    BookingListResponse, BookingResponse, CancelBookingRequest, CreateAccountBookingRequest,
    CreateGuestBookingRequest, GuestBookingResponse,
};
use crate::{errors::ServiceError, ApiResponse, AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct BookingListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 {
    1
}
fn default_per_page() -> u64 {
    20
}

/// Create a booking as an unauthenticated guest
#[utoipa::path(
    post,
    path = "/api/v1/bookings/guest",
    summary = "Create guest booking",
    description = "Create a booking for an unauthenticated rider and return the access token used to manage it",
    request_body = CreateGuestBookingRequest,
    responses(
        (status = 201, description = "Booking created", body = ApiResponse<GuestBookingResponse>),
        (status = 400, description = "Invalid trip or contact details", body = crate::errors::ErrorResponse),
    ),
    tag = "Bookings"
)]
pub async fn create_guest_booking(
    State(state): State<AppState>,
    Json(request): Json<CreateGuestBookingRequest>,
) -> Result<(StatusCode, Json<ApiResponse<GuestBookingResponse>>), ServiceError> {
    let response = state.services.bookings.create_guest_booking(request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(response))))
}

/// Create a booking for an existing account
#[utoipa::path(
    post,
    path = "/api/v1/bookings/account",
    summary = "Create account booking",
    request_body = CreateAccountBookingRequest,
    responses(
        (status = 201, description = "Booking created", body = ApiResponse<BookingResponse>),
        (status = 400, description = "Invalid trip details", body = crate::errors::ErrorResponse),
        (status = 404, description = "Account not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Bookings"
)]
pub async fn create_account_booking(
    State(state): State<AppState>,
    Json(request): Json<CreateAccountBookingRequest>,
) -> Result<(StatusCode, Json<ApiResponse<BookingResponse>>), ServiceError> {
    let response = state
        .services
        .bookings
        .create_account_booking(request)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(response))))
}

/// Get a booking by ID (staff)
#[utoipa::path(
    get,
    path = "/api/v1/bookings/{id}",
    summary = "Get booking",
    params(("id" = Uuid, Path, description = "Booking ID")),
    responses(
        (status = 200, description = "Booking found", body = ApiResponse<BookingResponse>),
        (status = 404, description = "Booking not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Bookings"
)]
pub async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<BookingResponse>>, ServiceError> {
    let response = state.services.bookings.get_booking(id).await?;
    Ok(Json(ApiResponse::success(response)))
}

/// List bookings owned by an account, newest first
#[utoipa::path(
    get,
    path = "/api/v1/accounts/{id}/bookings",
    summary = "List account bookings",
    params(
        ("id" = Uuid, Path, description = "Account ID"),
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("per_page" = Option<u64>, Query, description = "Items per page (default: 20, max: 100)"),
    ),
    responses(
        (status = 200, description = "Bookings retrieved", body = ApiResponse<BookingListResponse>),
    ),
    security(("Bearer" = [])),
    tag = "Bookings"
)]
pub async fn list_account_bookings(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<BookingListQuery>,
) -> Result<Json<ApiResponse<BookingListResponse>>, ServiceError> {
    let response = state
        .services
        .bookings
        .list_bookings_for_owner(BookingRef::Account(id), query.page, query.per_page)
        .await?;
    Ok(Json(ApiResponse::success(response)))
}

/// Get a booking through its guest access token
#[utoipa::path(
    get,
    path = "/api/v1/bookings/by-token/{token}",
    summary = "Get booking by access token",
    params(("token" = String, Path, description = "Guest access token")),
    responses(
        (status = 200, description = "Booking found", body = ApiResponse<BookingResponse>),
        (status = 404, description = "Unknown token", body = crate::errors::ErrorResponse),
        (status = 410, description = "Token expired", body = crate::errors::ErrorResponse),
    ),
    tag = "Bookings"
)]
pub async fn get_booking_by_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<ApiResponse<BookingResponse>>, ServiceError> {
    let response = state.services.bookings.get_booking_by_token(&token).await?;
    Ok(Json(ApiResponse::success(response)))
}

/// Cancel a booking through its guest access token
#[utoipa::path(
    post,
    path = "/api/v1/bookings/by-token/{token}/cancel",
    summary = "Cancel booking by access token",
    params(("token" = String, Path, description = "Guest access token")),
    request_body = CancelBookingRequest,
    responses(
        (status = 200, description = "Booking cancelled", body = ApiResponse<BookingResponse>),
        (status = 404, description = "Unknown token", body = crate::errors::ErrorResponse),
        (status = 409, description = "Booking is already terminal", body = crate::errors::ErrorResponse),
        (status = 410, description = "Token expired", body = crate::errors::ErrorResponse),
    ),
    tag = "Bookings"
)]
pub async fn cancel_booking_by_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(request): Json<CancelBookingRequest>,
) -> Result<Json<ApiResponse<BookingResponse>>, ServiceError> {
    let response = state
        .services
        .bookings
        .cancel_booking_by_token(&token, request)
        .await?;
    Ok(Json(ApiResponse::success(response)))
}

/// Cancel a booking (staff)
#[utoipa::path(
    post,
    path = "/api/v1/bookings/{id}/cancel",
    summary = "Cancel booking",
    params(("id" = Uuid, Path, description = "Booking ID")),
    request_body = CancelBookingRequest,
    responses(
        (status = 200, description = "Booking cancelled", body = ApiResponse<BookingResponse>),
        (status = 404, description = "Booking not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Booking is already terminal", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Bookings"
)]
pub async fn cancel_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<CancelBookingRequest>,
) -> Result<Json<ApiResponse<BookingResponse>>, ServiceError> {
    let response = state.services.bookings.cancel_booking(id, request).await?;
    Ok(Json(ApiResponse::success(response)))
}

/// Mark the trip as started
#[utoipa::path(
    post,
    path = "/api/v1/bookings/{id}/start",
    summary = "Start trip",
    params(("id" = Uuid, Path, description = "Booking ID")),
    responses(
        (status = 200, description = "Trip started", body = ApiResponse<BookingResponse>),
        (status = 404, description = "Booking not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Booking is not payment-confirmed", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Bookings"
)]
pub async fn start_trip(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<BookingResponse>>, ServiceError> {
    let response = state.services.bookings.start_trip(id).await?;
    Ok(Json(ApiResponse::success(response)))
}

/// Mark the trip as completed
#[utoipa::path(
    post,
    path = "/api/v1/bookings/{id}/complete",
    summary = "Complete trip",
    params(("id" = Uuid, Path, description = "Booking ID")),
    responses(
        (status = 200, description = "Trip completed", body = ApiResponse<BookingResponse>),
        (status = 404, description = "Booking not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Booking is not in progress", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Bookings"
)]
pub async fn complete_trip(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<BookingResponse>>, ServiceError> {
    let response = state.services.bookings.complete_trip(id).await?;
    Ok(Json(ApiResponse::success(response)))
}
