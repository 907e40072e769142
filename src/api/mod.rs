pub mod handlers;
pub mod middleware;
pub mod state;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use std::sync::Arc;

use crate::{
    config::Settings,
    notifications::NotificationDispatcher,
    service::ServiceContext,
};
use state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(title = "Tourdesk API", description = "Tour and event bookings with Stripe payment reconciliation"),
    paths(
        handlers::root::health_check,
        handlers::bookings::create,
        handlers::bookings::list,
        handlers::bookings::get,
        handlers::bookings::payments,
        handlers::bookings::cancel,
        handlers::bookings::price_diff,
        handlers::bookings::edit,
        handlers::bookings::edit_refund,
        handlers::bookings::edit_payment_intent,
        handlers::payments::create_intent,
        handlers::payments::stripe_webhook,
        handlers::admin::refund,
        handlers::admin::complete_past,
        handlers::admin::notifications,
        handlers::admin::dispatch_outbox,
    ),
    tags(
        (name = "bookings", description = "Booking lifecycle and edits"),
        (name = "payments", description = "PaymentIntents and the Stripe webhook"),
        (name = "admin", description = "Operator endpoints"),
        (name = "service", description = "Health")
    )
)]
pub struct ApiDoc;

pub fn create_app(
    service_context: Arc<ServiceContext>,
    dispatcher: Arc<NotificationDispatcher>,
    settings: Arc<Settings>,
) -> Router {
    let app_state = AppState::new(service_context, dispatcher, settings);

    Router::new()
        // Root and health endpoints
        .route("/", get(handlers::root::root))
        .route("/health", get(handlers::root::health_check))

        .nest("/api", api_routes())
        .nest("/admin", admin_routes())
        .merge(SwaggerUi::new("/api/docs").url("/api/docs/openapi.json", ApiDoc::openapi()))

        .with_state(app_state)

        // Middleware
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/bookings", booking_routes())
        .nest("/payments", payment_routes())
}

fn booking_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::bookings::create).get(handlers::bookings::list))
        .route("/cancel", post(handlers::bookings::cancel))
        .route("/:id", get(handlers::bookings::get))
        .route("/:id/payments", get(handlers::bookings::payments))
        .route("/:id/edit", post(handlers::bookings::edit))
        .route("/:id/edit/price-diff", post(handlers::bookings::price_diff))
        .route("/:id/edit/refund", post(handlers::bookings::edit_refund))
        .route("/:id/edit/payment-intent", post(handlers::bookings::edit_payment_intent))
        .route_layer(axum::middleware::from_fn(middleware::auth::require_auth))
}

fn payment_routes() -> Router<AppState> {
    Router::new()
        // Called by Stripe, authenticated by signature instead of identity headers
        .route("/webhook/stripe", post(handlers::payments::stripe_webhook))
        .merge(Router::new()
            .route("/intent", post(handlers::payments::create_intent))
            .route_layer(axum::middleware::from_fn(middleware::auth::require_auth))
        )
}

fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/bookings/complete-past", post(handlers::admin::complete_past))
        .route("/bookings/:id/refund", post(handlers::admin::refund))
        .route("/bookings/:id/notifications", get(handlers::admin::notifications))
        .route("/outbox/dispatch", post(handlers::admin::dispatch_outbox))
        .route_layer(axum::middleware::from_fn(middleware::auth::require_admin))
}
