mod account;
mod analytics;
mod extract;
mod reservations;
mod resources;
mod users;

pub use extract::{ApiJson, ApiPath};
pub use users::normalize_email;

use axum::{
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::admission::AdmissionEngine;
use crate::auth::AuthSettings;
use crate::errors::{Error, ErrorResponse, Result};
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub engine: AdmissionEngine,
    pub auth: Arc<AuthSettings>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/auth/me", get(account::me))
        .route("/api/auth/logout", post(account::logout))
        .route("/api/auth/update-profile", put(account::update_profile))
        .route(
            "/api/reservations",
            get(reservations::list)
                .post(reservations::create)
                .head(reservations::pending_count),
        )
        .route(
            "/api/reservations/:id",
            get(reservations::get_one)
                .patch(reservations::decide)
                .delete(reservations::cancel),
        )
        .route("/api/resources", get(resources::list).post(resources::create))
        .route(
            "/api/resources/:id",
            get(resources::get_one).put(resources::update).delete(resources::remove),
        )
        .route("/api/users", get(users::list).post(users::create))
        .route(
            "/api/users/:id",
            get(users::get_one).put(users::update).delete(users::remove),
        )
        .route("/api/analytics", get(analytics::report))
        .route("/api/notifications/preferences", put(account::update_preferences))
        .route(
            "/api/notifications/tokens",
            post(account::register_token).delete(account::unregister_token),
        )
        .fallback(not_found_fallback)
        .with_state(state)
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
}

pub async fn health_check() -> &'static str {
    "OK"
}

async fn not_found_fallback() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: "Not found".to_string(),
            field: None,
            conflicting_id: None,
        }),
    )
}

/// Value of a required request field, trimmed.
pub(crate) fn required<'a>(value: &'a Option<String>, field: &'static str) -> Result<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::validation(field, format!("{field} is required"))),
    }
}

pub(crate) fn parse_uuid(value: &str, field: &'static str) -> Result<Uuid> {
    value
        .parse()
        .map_err(|_| Error::validation(field, format!("{field} must be a valid id")))
}

pub(crate) fn parse_time(value: &str, field: &'static str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| Error::validation(field, format!("{field} must be an RFC 3339 timestamp")))
}
