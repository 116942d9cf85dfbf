use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "CareRide API",
        version = "0.3.0",
        description = r#"
# CareRide Booking and Settlement API

Booking-to-payment core for assisted rider transport: fare quoting,
guest and account bookings, payment intents, manual cash/bank
settlement by drivers, per-recipient fare splits, and promotion of
guest identities into durable accounts.

## Authentication

Guests authenticate per booking with the opaque access token returned
when the booking is created; it travels in the URL path of the
`by-token` endpoints. Staff endpoints require a JWT bearer token:

```
Authorization: Bearer <your-jwt-token>
```

## Error Handling

Errors use a consistent shape with appropriate HTTP status codes:

```json
{
  "error": "Conflict",
  "message": "Booking 550e8400-... is payment_confirmed; cannot confirm payment",
  "timestamp": "2026-03-09T10:30:00Z"
}
```

Expired guest tokens are reported as `410 Gone` and never leak the
booking they pointed at.
        "#,
        contact(
            name = "CareRide Support",
            email = "support@careride.example.com"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Quotes", description = "Fare quoting"),
        (name = "Bookings", description = "Booking lifecycle"),
        (name = "Payments", description = "Processor payment intents and callbacks"),
        (name = "Settlement", description = "Manual settlement and fare splits"),
        (name = "Accounts", description = "Guest promotion and account lookup")
    ),
    paths(
        // Quotes
        crate::handlers::quotes::create_quote,

        // Bookings
        crate::handlers::bookings::create_guest_booking,
        crate::handlers::bookings::create_account_booking,
        crate::handlers::bookings::get_booking,
        crate::handlers::bookings::list_account_bookings,
        crate::handlers::bookings::get_booking_by_token,
        crate::handlers::bookings::cancel_booking_by_token,
        crate::handlers::bookings::cancel_booking,
        crate::handlers::bookings::start_trip,
        crate::handlers::bookings::complete_trip,

        // Payments
        crate::handlers::payments::create_payment_intent,
        crate::handlers::payments::confirm_processor_payment,
        crate::handlers::payment_webhooks::payment_webhook,

        // Settlement
        crate::handlers::settlement::confirm_payment,
        crate::handlers::settlement::reject_payment,
        crate::handlers::settlement::get_settlement,

        // Accounts
        crate::handlers::accounts::promote_guest,
        crate::handlers::accounts::get_account,
    ),
    components(
        schemas(
            // Common types
            crate::ApiResponse<serde_json::Value>,

            // Quote types
            crate::services::fares::QuoteRequest,
            crate::services::fares::FareComponents,
            crate::handlers::quotes::QuoteResponse,

            // Booking types
            crate::services::bookings::CreateGuestBookingRequest,
            crate::services::bookings::CreateAccountBookingRequest,
            crate::services::bookings::CancelBookingRequest,
            crate::services::bookings::BookingResponse,
            crate::services::bookings::GuestBookingResponse,
            crate::services::bookings::BookingListResponse,
            crate::services::guests::GuestContact,
            crate::models::BookingRef,
            crate::models::BookingStatus,
            crate::models::BookingType,
            crate::models::PaymentMethod,
            crate::models::VehicleFeature,

            // Payment and settlement types
            crate::services::payments::PaymentIntentResponse,
            crate::services::payments::ConfirmProcessorPaymentRequest,
            crate::services::payments::WebhookAck,
            crate::services::settlement::RejectPaymentRequest,
            crate::services::settlement::SettlementResponse,
            crate::services::settlement::TransactionView,
            crate::services::settlement::SplitView,
            crate::models::IntentStatus,
            crate::models::TransactionStatus,
            crate::models::RecipientType,
            crate::models::SplitStatus,

            // Account types
            crate::services::promotion::PromoteRequest,
            crate::services::promotion::PromoteResponse,
            crate::services::promotion::AccountResponse,

            // Error types
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_generates() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string_pretty(&openapi).unwrap();
        assert!(json.contains("CareRide API"));
        assert!(json.contains("/api/v1/quotes"));
        assert!(json.contains("/api/v1/bookings/guest"));
    }
}
