mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::{guest_booking_payload, response_json, trip_payload, TestApp};

#[tokio::test]
async fn quote_returns_published_fare() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::POST, "/api/v1/quotes", Some(trip_payload()), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["success"], json!(true));

    let data = &body["data"];
    assert_eq!(data["fare"]["base_fare"], json!("8.50"));
    assert_eq!(data["fare"]["distance_fare"], json!("11.00"));
    assert_eq!(data["fare"]["vehicle_feature_fare"], json!("6.00"));
    assert_eq!(data["fare"]["support_worker_fare"], json!("20.50"));
    assert_eq!(data["fare"]["peak_surcharge"], json!("0"));
    assert_eq!(data["fare_estimate"], json!("46.00"));
    assert_eq!(data["currency"], json!("AUD"));
    assert_eq!(data["peak"], json!(false));
}

#[tokio::test]
async fn quote_applies_peak_surcharge_on_weekday_mornings() {
    let app = TestApp::new().await;

    // 21:30 UTC Monday is 07:30 Tuesday in the service area (UTC+10)
    let mut trip = trip_payload();
    trip["pickup_time"] = json!("2024-07-01T21:30:00Z");

    let response = app
        .request(Method::POST, "/api/v1/quotes", Some(trip), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    let data = &body["data"];
    // 15% of base + distance: 0.15 * 19.50 = 2.925, rounded half away from zero
    assert_eq!(data["fare"]["peak_surcharge"], json!("2.93"));
    assert_eq!(data["fare_estimate"], json!("48.93"));
    assert_eq!(data["peak"], json!(true));
}

#[tokio::test]
async fn quote_charges_duplicate_features_once() {
    let app = TestApp::new().await;

    let mut trip = trip_payload();
    trip["vehicle_features"] = json!(["wheelchair_access", "wheelchair_access", "walker_storage"]);

    let response = app
        .request(Method::POST, "/api/v1/quotes", Some(trip), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    // 6.00 for wheelchair access (once) + 2.50 for walker storage
    assert_eq!(body["data"]["fare"]["vehicle_feature_fare"], json!("8.50"));
}

#[tokio::test]
async fn quote_rejects_non_positive_distance() {
    let app = TestApp::new().await;

    let mut trip = trip_payload();
    trip["distance_km"] = json!("0");

    let response = app
        .request(Method::POST, "/api/v1/quotes", Some(trip), None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = response_json(response).await;
    assert_eq!(body["error"], json!("Bad Request"));
}

#[tokio::test]
async fn guest_cash_booking_starts_pending_payment() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/bookings/guest",
            Some(guest_booking_payload("rhonda@example.com", "cash_bank")),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = response_json(response).await;
    let data = &body["data"];
    let booking = &data["booking"];

    assert_eq!(booking["status"], json!("pending_payment"));
    assert_eq!(booking["payment_method"], json!("cash_bank"));
    assert_eq!(booking["owner"]["owner_type"], json!("guest"));
    assert_eq!(booking["fare_estimate"], json!("46.00"));
    assert_eq!(booking["currency"], json!("AUD"));

    // 32 random bytes as unpadded url-safe base64
    let token = data["access_token"].as_str().expect("access token");
    assert_eq!(token.len(), 43);
    assert!(data["token_expires_at"].is_string());
}

#[tokio::test]
async fn guest_processor_booking_starts_as_draft() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/bookings/guest",
            Some(guest_booking_payload("draft@example.com", "processor")),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = response_json(response).await;
    assert_eq!(body["data"]["booking"]["status"], json!("draft"));
    assert_eq!(body["data"]["booking"]["payment_method"], json!("processor"));
}

#[tokio::test]
async fn guest_booking_rejects_invalid_contact() {
    let app = TestApp::new().await;

    let mut payload = guest_booking_payload("not-an-email", "cash_bank");
    payload["contact"]["email"] = json!("not-an-email");

    let response = app
        .request(Method::POST, "/api/v1/bookings/guest", Some(payload), None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn account_booking_requires_staff_token() {
    let app = TestApp::new().await;

    let payload = json!({
        "account_id": uuid::Uuid::new_v4(),
        "trip": trip_payload(),
        "payment_method": "cash_bank"
    });

    let response = app
        .request(
            Method::POST,
            "/api/v1/bookings/account",
            Some(payload.clone()),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Authenticated, but the account does not exist
    let response = app
        .request_authenticated(Method::POST, "/api/v1/bookings/account", Some(payload))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn trip_runs_from_payment_to_completion() {
    let app = TestApp::new().await;
    let (booking_id, _token) = app
        .create_guest_booking("lifecycle@example.com", "cash_bank")
        .await;

    let response = app
        .request_authenticated(
            Method::POST,
            &format!("/api/v1/bookings/{}/confirm-payment", booking_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], json!("payment_confirmed"));

    let response = app
        .request_authenticated(
            Method::POST,
            &format!("/api/v1/bookings/{}/start", booking_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], json!("in_progress"));

    let response = app
        .request_authenticated(
            Method::POST,
            &format!("/api/v1/bookings/{}/complete", booking_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], json!("completed"));
}

#[tokio::test]
async fn trip_cannot_start_before_payment() {
    let app = TestApp::new().await;
    let (booking_id, _token) = app
        .create_guest_booking("eager@example.com", "cash_bank")
        .await;

    let response = app
        .request_authenticated(
            Method::POST,
            &format!("/api/v1/bookings/{}/start", booking_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = response_json(response).await;
    assert_eq!(body["error"], json!("Conflict"));
}

#[tokio::test]
async fn completed_booking_cannot_be_cancelled() {
    let app = TestApp::new().await;
    let (booking_id, _token) = app
        .create_guest_booking("done@example.com", "cash_bank")
        .await;

    for step in ["confirm-payment", "start", "complete"] {
        let response = app
            .request_authenticated(
                Method::POST,
                &format!("/api/v1/bookings/{}/{}", booking_id, step),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK, "step {} failed", step);
    }

    let response = app
        .request_authenticated(
            Method::POST,
            &format!("/api/v1/bookings/{}/cancel", booking_id),
            Some(json!({ "reason": "changed my mind" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn guest_can_cancel_through_access_token() {
    let app = TestApp::new().await;
    let (_booking_id, token) = app
        .create_guest_booking("cancel@example.com", "cash_bank")
        .await;

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/bookings/by-token/{}/cancel", token),
            Some(json!({ "reason": "plans changed" })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], json!("cancelled"));
    assert_eq!(body["data"]["cancellation_reason"], json!("plans changed"));

    // Cancelling again hits the terminal-state guard
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/bookings/by-token/{}/cancel", token),
            Some(json!({ "reason": "again" })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn staff_booking_lookup_is_authenticated() {
    let app = TestApp::new().await;
    let (booking_id, _token) = app
        .create_guest_booking("lookup@example.com", "cash_bank")
        .await;

    let uri = format!("/api/v1/bookings/{}", booking_id);

    let response = app.request(Method::GET, &uri, None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.request_authenticated(Method::GET, &uri, None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["data"]["id"].as_str(), Some(booking_id.as_str()));
    assert_eq!(body["data"]["owner"]["owner_type"], json!("guest"));
}

#[tokio::test]
async fn unknown_booking_returns_not_found() {
    let app = TestApp::new().await;

    let response = app
        .request_authenticated(
            Method::GET,
            &format!("/api/v1/bookings/{}", uuid::Uuid::new_v4()),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = response_json(response).await;
    assert_eq!(body["error"], json!("Not Found"));
}
