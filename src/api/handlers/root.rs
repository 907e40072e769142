use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::api::state::AppState;

pub async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "Tourdesk API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Tour and event bookings with Stripe payment reconciliation",
        "status": "operational",
        "endpoints": {
            "health": "/health",
            "bookings": "/api/bookings",
            "payments": "/api/payments",
            "admin": "/admin",
            "docs": "/api/docs"
        }
    }))
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "service",
    responses((status = 200, description = "Service and database are reachable"))
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = sqlx::query("SELECT 1")
        .execute(&state.service_context.db_pool)
        .await
        .is_ok();

    let status = if database { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(json!({
        "status": if database { "healthy" } else { "degraded" },
        "database": database,
        "payments": state.service_context.reconciler.is_some(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}
