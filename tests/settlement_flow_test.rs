mod common;

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use serde_json::{json, Value};

use common::{response_json, TestApp};

async fn confirm(app: &TestApp, booking_id: &str, token: &str) -> axum::response::Response {
    app.request(
        Method::POST,
        &format!("/api/v1/bookings/{}/confirm-payment", booking_id),
        None,
        Some(token),
    )
    .await
}

#[tokio::test]
async fn driver_confirmation_settles_a_cash_booking() {
    let app = TestApp::new().await;
    let (booking_id, _token) = app
        .create_guest_booking("settle@example.com", "cash_bank")
        .await;

    let driver = app.issue_staff_token(&["driver"], &["settlement:confirm"]);
    let response = confirm(&app, &booking_id, &driver).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    let data = &body["data"];
    assert_eq!(data["booking_id"].as_str(), Some(booking_id.as_str()));
    assert_eq!(data["status"], json!("payment_confirmed"));

    let tx = &data["transaction"];
    assert_eq!(tx["amount"], json!("46.00"));
    assert_eq!(tx["payment_method"], json!("cash_bank"));
    assert_eq!(tx["status"], json!("completed"));
    assert_eq!(tx["processor_reference"], Value::Null);

    let splits = tx["splits"].as_array().expect("splits array");
    let amounts: Vec<(&str, &str)> = splits
        .iter()
        .map(|s| {
            (
                s["recipient_type"].as_str().unwrap(),
                s["amount"].as_str().unwrap(),
            )
        })
        .collect();
    assert!(amounts.contains(&("driver", "17.85")));
    assert!(amounts.contains(&("support_worker", "14.35")));
    assert!(amounts.contains(&("processor", "1.63")));
    assert!(amounts.contains(&("platform", "12.17")));
    assert_eq!(splits.len(), 4);

    for split in splits {
        assert_eq!(split["status"], json!("pending"));
    }
}

#[tokio::test]
async fn confirmation_requires_the_settlement_permission() {
    let app = TestApp::new().await;
    let (booking_id, _token) = app
        .create_guest_booking("gated@example.com", "cash_bank")
        .await;

    let reader = app.issue_staff_token(&["driver"], &["bookings:read"]);
    let response = confirm(&app, &booking_id, &reader).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let driver = app.issue_staff_token(&["driver"], &["settlement:confirm"]);
    let response = confirm(&app, &booking_id, &driver).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn a_booking_settles_at_most_once() {
    let app = TestApp::new().await;
    let (booking_id, _token) = app
        .create_guest_booking("once@example.com", "cash_bank")
        .await;

    let response = confirm(&app, &booking_id, app.token()).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = confirm(&app, &booking_id, app.token()).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn racing_confirmations_settle_exactly_once() {
    let app = Arc::new(TestApp::new().await);
    let (booking_id, _token) = app
        .create_guest_booking("race@example.com", "cash_bank")
        .await;

    let mut handles = Vec::new();
    for _ in 0..2 {
        let app = Arc::clone(&app);
        let booking_id = booking_id.clone();
        let token = app.token().to_string();
        handles.push(tokio::spawn(async move {
            confirm(&app, &booking_id, &token).await.status()
        }));
    }

    let mut statuses = Vec::new();
    for handle in handles {
        statuses.push(handle.await.expect("confirm task"));
    }
    statuses.sort_by_key(|s| s.as_u16());
    assert_eq!(statuses, vec![StatusCode::OK, StatusCode::CONFLICT]);

    // The winner wrote one transaction with one full set of splits
    let response = app
        .request_authenticated(
            Method::GET,
            &format!("/api/v1/bookings/{}/settlement", booking_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(
        body["data"]["transaction"]["splits"]
            .as_array()
            .expect("splits")
            .len(),
        4
    );
}

#[tokio::test]
async fn rejection_requires_a_real_reason() {
    let app = TestApp::new().await;
    let (booking_id, token) = app
        .create_guest_booking("no-reason@example.com", "cash_bank")
        .await;

    let response = app
        .request_authenticated(
            Method::POST,
            &format!("/api/v1/bookings/{}/reject-payment", booking_id),
            Some(json!({ "reason": "   " })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Nothing was written; the booking still settles normally
    let lookup = app
        .request(
            Method::GET,
            &format!("/api/v1/bookings/by-token/{}", token),
            None,
            None,
        )
        .await;
    let body = response_json(lookup).await;
    assert_eq!(body["data"]["status"], json!("pending_payment"));

    let response = confirm(&app, &booking_id, app.token()).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn rejection_marks_payment_failed_with_the_reason() {
    let app = TestApp::new().await;
    let (booking_id, _token) = app
        .create_guest_booking("rejected@example.com", "cash_bank")
        .await;

    let response = app
        .request_authenticated(
            Method::POST,
            &format!("/api/v1/bookings/{}/reject-payment", booking_id),
            Some(json!({ "reason": "rider had no cash" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], json!("payment_failed"));
    assert_eq!(body["data"]["failure_reason"], json!("rider had no cash"));

    // A rejected booking is no longer confirmable
    let response = confirm(&app, &booking_id, app.token()).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn settlement_lookup_reflects_the_confirm() {
    let app = TestApp::new().await;
    let (booking_id, _token) = app
        .create_guest_booking("ledger@example.com", "cash_bank")
        .await;

    let uri = format!("/api/v1/bookings/{}/settlement", booking_id);

    let response = app.request_authenticated(Method::GET, &uri, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = confirm(&app, &booking_id, app.token()).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.request_authenticated(Method::GET, &uri, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["booking_id"].as_str(), Some(booking_id.as_str()));
    assert_eq!(body["data"]["status"], json!("payment_confirmed"));
    assert_eq!(body["data"]["transaction"]["amount"], json!("46.00"));
}

#[tokio::test]
async fn processor_bookings_are_not_manually_confirmable() {
    let app = TestApp::new().await;
    let (booking_id, _token) = app
        .create_guest_booking("card-rider@example.com", "processor")
        .await;

    let response = confirm(&app, &booking_id, app.token()).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .request_authenticated(
            Method::POST,
            &format!("/api/v1/bookings/{}/reject-payment", booking_id),
            Some(json!({ "reason": "wrong lane" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
