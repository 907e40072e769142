mod common;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use common::{intent_event, TestApp};
use serde_json::{json, Value};
use tower::ServiceExt;
use tourdesk::{
    api::create_app,
    config::Settings,
    domain::{BookingStatus, PaymentStatus},
    notifications::NotificationDispatcher,
    payments::webhook::sign_payload,
    repository::PaymentRepository,
};
use uuid::Uuid;

const WEBHOOK_SECRET: &str = "whsec_test_secret";

fn router(app: &TestApp) -> Router {
    let mut settings = Settings::default();
    settings.stripe.enabled = true;
    settings.stripe.webhook_secret = Some(WEBHOOK_SECRET.to_string());

    let dispatcher = Arc::new(NotificationDispatcher::new(
        app.ctx.outbox_repo.clone(),
        app.ctx.notification_log_repo.clone(),
        app.ctx.booking_repo.clone(),
        50,
    ));
    create_app(app.ctx.clone(), dispatcher, Arc::new(settings))
}

fn json_request(method: &str, uri: &str, user: Option<(Uuid, &str)>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some((id, role)) = user {
        builder = builder
            .header("x-user-id", id.to_string())
            .header("x-user-role", role);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

fn create_body(app: &TestApp, adults: i64) -> Value {
    json!({
        "bookable_id": app.catalog.tour.id,
        "schedule_id": app.catalog.schedule.id,
        "pickup_location_id": app.catalog.harbour.id,
        "pickup_time_id": app.catalog.harbour_time.id,
        "adult_count": adults,
        "child_count": 0,
        "contact_name": "Ana Silva",
        "contact_email": "ana@example.com"
    })
}

#[tokio::test]
async fn test_health_check() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let response = router(&app)
        .oneshot(Request::builder().uri("/health").body(Body::empty())?)
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["database"], true);
    assert_eq!(body["payments"], true);
    Ok(())
}

#[tokio::test]
async fn test_booking_routes_require_identity() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let response = router(&app)
        .oneshot(json_request("POST", "/api/bookings", None, create_body(&app, 2)))
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn test_create_booking_endpoint() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let user = Uuid::new_v4();

    let response = router(&app)
        .oneshot(json_request("POST", "/api/bookings", Some((user, "customer")), create_body(&app, 2)))
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["status"], "pending");
    assert_eq!(body["pricing"]["total_cents"], 10000);

    let response = router(&app)
        .oneshot(json_request("POST", "/api/bookings", Some((user, "customer")), create_body(&app, 0)))
        .await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    Ok(())
}

#[tokio::test]
async fn test_other_users_booking_is_forbidden() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let (booking, _) = app.confirmed_booking().await?;

    let response = router(&app)
        .oneshot(
            Request::builder()
                .uri(format!("/api/bookings/{}", booking.id))
                .header("x-user-id", Uuid::new_v4().to_string())
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = router(&app)
        .oneshot(
            Request::builder()
                .uri(format!("/api/bookings/{}", booking.id))
                .header("x-user-id", Uuid::new_v4().to_string())
                .header("x-user-role", "admin")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn test_admin_routes_require_admin_role() -> anyhow::Result<()> {
    let app = TestApp::new().await?;

    let response = router(&app)
        .oneshot(json_request(
            "POST",
            "/admin/outbox/dispatch",
            Some((Uuid::new_v4(), "customer")),
            json!({}),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = router(&app)
        .oneshot(json_request(
            "POST",
            "/admin/outbox/dispatch",
            Some((Uuid::new_v4(), "admin")),
            json!({}),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn test_webhook_rejects_bad_signatures() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let payload = json!({ "id": "evt_1", "type": "customer.created", "data": { "object": {} } }).to_string();

    let response = router(&app)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/payments/webhook/stripe")
                .body(Body::from(payload.clone()))?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let forged = sign_payload(&payload, "whsec_wrong", chrono::Utc::now().timestamp());
    let response = router(&app)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/payments/webhook/stripe")
                .header("stripe-signature", forged)
                .body(Body::from(payload))?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn test_signed_webhook_confirms_booking() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let booking = app
        .ctx
        .booking_service
        .create_booking(Uuid::new_v4(), app.create_request(2, 0))
        .await?;
    let intent = app.ctx.booking_service.initiate_payment(booking.id, 10000).await?;

    let payload = intent_event(
        "evt_signed",
        "payment_intent.succeeded",
        &intent.payment_intent_id,
        10000,
        json!({ "bookingId": booking.id.to_string() }),
    )
    .to_string();
    let signature = sign_payload(&payload, WEBHOOK_SECRET, chrono::Utc::now().timestamp());

    let response = router(&app)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/payments/webhook/stripe")
                .header("stripe-signature", signature)
                .body(Body::from(payload))?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["received"], true);

    let stored = app.ctx.booking_service.get_booking(booking.id).await?;
    assert_eq!(stored.status, BookingStatus::Confirmed);
    let payment = app
        .ctx
        .payment_repo
        .find_by_intent_id(&intent.payment_intent_id)
        .await?
        .expect("payment");
    assert_eq!(payment.status, PaymentStatus::Completed);

    Ok(())
}

#[tokio::test]
async fn test_price_diff_endpoint() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let (booking, _) = app.confirmed_booking().await?;

    let body = json!({
        "schedule_id": app.catalog.schedule.id,
        "pickup_location_id": app.catalog.village.id,
        "pickup_time_id": app.catalog.village_time.id,
        "adult_count": 2,
        "child_count": 0
    });
    let response = router(&app)
        .oneshot(json_request(
            "POST",
            &format!("/api/bookings/{}/edit/price-diff", booking.id),
            Some((booking.user_id, "customer")),
            body,
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["diff"]["classification"], "downgrade");
    assert_eq!(body["diff"]["difference_cents"], -4000);

    Ok(())
}
