//! CareRide API Library
//!
//! This crate provides the booking and settlement core for the CareRide
//! platform: fare quotes, guest and account bookings, payment processing,
//! and driver-confirmed manual settlement.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod message_queue;
pub mod migrator;
pub mod models;
pub mod openapi;
pub mod payment_processor;
pub mod services;

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::auth::consts as perm;
use crate::auth::AuthRouterExt;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub services: handlers::AppServices,
    /// Verifies processor webhook signatures. `None` means the shared
    /// secret is not configured and signatures are not checked.
    pub webhook_verifier: Option<Arc<payment_processor::WebhookVerifier>>,
}

// Common response wrapper
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
        }
    }

    pub fn validation_errors(errors: Vec<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some("Validation failed".to_string()),
            errors: Some(errors),
        }
    }
}

/// Full v1 API surface.
///
/// Rider routes authenticate with per-booking access tokens carried in
/// the path; staff routes require a bearer JWT and the named permission.
pub fn api_v1_routes() -> Router<AppState> {
    // Rider-facing routes (no JWT)
    let rider = Router::new()
        .route("/quotes", post(handlers::quotes::create_quote))
        .route(
            "/bookings/guest",
            post(handlers::bookings::create_guest_booking),
        )
        .route(
            "/bookings/by-token/:token",
            get(handlers::bookings::get_booking_by_token),
        )
        .route(
            "/bookings/by-token/:token/cancel",
            post(handlers::bookings::cancel_booking_by_token),
        )
        .route(
            "/bookings/by-token/:token/payment-intent",
            post(handlers::payments::create_payment_intent),
        )
        .route(
            "/bookings/by-token/:token/confirm-payment",
            post(handlers::payments::confirm_processor_payment),
        )
        .route("/accounts/promote", post(handlers::accounts::promote_guest));

    // Payment webhook (does not require auth, but signature-verified)
    let payment_webhook = Router::new().route(
        "/payments/webhook",
        post(handlers::payment_webhooks::payment_webhook),
    );

    // Staff routes with permission gating
    let bookings_read = Router::new()
        .route("/bookings/:id", get(handlers::bookings::get_booking))
        .route(
            "/accounts/:id/bookings",
            get(handlers::bookings::list_account_bookings),
        )
        .with_permission(perm::BOOKINGS_READ);

    let bookings_create = Router::new()
        .route(
            "/bookings/account",
            post(handlers::bookings::create_account_booking),
        )
        .with_permission(perm::BOOKINGS_CREATE);

    let bookings_cancel = Router::new()
        .route(
            "/bookings/:id/cancel",
            post(handlers::bookings::cancel_booking),
        )
        .with_permission(perm::BOOKINGS_CANCEL);

    let trips_update = Router::new()
        .route("/bookings/:id/start", post(handlers::bookings::start_trip))
        .route(
            "/bookings/:id/complete",
            post(handlers::bookings::complete_trip),
        )
        .with_permission(perm::TRIPS_UPDATE);

    let settlement_confirm = Router::new()
        .route(
            "/bookings/:id/confirm-payment",
            post(handlers::settlement::confirm_payment),
        )
        .route(
            "/bookings/:id/reject-payment",
            post(handlers::settlement::reject_payment),
        )
        .with_permission(perm::SETTLEMENT_CONFIRM);

    let settlement_read = Router::new()
        .route(
            "/bookings/:id/settlement",
            get(handlers::settlement::get_settlement),
        )
        .with_permission(perm::SETTLEMENT_READ);

    let accounts_read = Router::new()
        .route("/accounts/:id", get(handlers::accounts::get_account))
        .with_permission(perm::ACCOUNTS_READ);

    Router::new()
        // Status and health endpoints
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        // Rider API (access tokens in path)
        .merge(rider)
        .merge(payment_webhook)
        // Staff API (auth + permissions)
        .merge(bookings_read)
        .merge(bookings_create)
        .merge(bookings_cancel)
        .merge(trips_update)
        .merge(settlement_confirm)
        .merge(settlement_read)
        .merge(accounts_read)
}

async fn api_status() -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let status_data = json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "careride-api",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "environment": std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
    });

    Ok(Json(ApiResponse::success(status_data)))
}

async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let db_status = match db::check_connection(&state.db).await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    let health_data = json!({
        "status": db_status,
        "checks": {
            "database": db_status,
        },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(health_data)))
}

#[cfg(test)]
mod response_tests {
    use super::*;

    #[test]
    fn success_response_wraps_data() {
        let response = ApiResponse::success("ok");
        assert!(response.success);
        assert_eq!(response.data, Some("ok"));
        assert!(response.message.is_none());
        assert!(response.errors.is_none());
    }

    #[test]
    fn error_response_carries_message() {
        let response = ApiResponse::<()>::error("oops".into());
        assert!(!response.success);
        assert!(response.data.is_none());
        assert_eq!(response.message.as_deref(), Some("oops"));
    }

    #[test]
    fn validation_errors_response_lists_failures() {
        let response = ApiResponse::<()>::validation_errors(vec!["missing".into()]);
        assert!(!response.success);
        assert_eq!(response.message.as_deref(), Some("Validation failed"));
        assert_eq!(response.errors, Some(vec!["missing".to_string()]));
    }
}
