use axum::{extract::State, response::Json};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::services::fares::{FareComponents, FareSchedule, QuoteRequest};
use crate::{errors::ServiceError, ApiResponse, AppState};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QuoteResponse {
    pub fare: FareComponents,
    /// Sum of the fare components; what the booking will carry as its
    /// fare estimate.
    pub fare_estimate: Decimal,
    pub currency: String,
    pub peak: bool,
}

/// Price a trip without creating a booking
#[utoipa::path(
    post,
    path = "/api/v1/quotes",
    summary = "Quote a trip",
    description = "Price a trip from its distance, features, and pickup time without persisting anything",
    request_body = QuoteRequest,
    responses(
        (status = 200, description = "Quote calculated", body = ApiResponse<QuoteResponse>),
        (status = 400, description = "Invalid trip details", body = crate::errors::ErrorResponse),
    ),
    tag = "Quotes"
)]
pub async fn create_quote(
    State(state): State<AppState>,
    Json(request): Json<QuoteRequest>,
) -> Result<Json<ApiResponse<QuoteResponse>>, ServiceError> {
    let schedule = FareSchedule::new(state.config.fare_local_offset_minutes);
    let fare = schedule.quote(&request)?;

    Ok(Json(ApiResponse::success(QuoteResponse {
        fare_estimate: fare.total(),
        peak: schedule.is_peak(request.pickup_time),
        currency: state.config.default_currency.clone(),
        fare,
    })))
}
