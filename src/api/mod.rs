//! REST API under `/api/v1`.
//!
//! Every route except login and the PDF download sits behind
//! [`auth::require_auth`], which resolves the `Authorization` header to a
//! [`CurrentUser`](auth::CurrentUser) extension. Errors leave handlers as
//! [`ApiErr`] and are rendered in the client's expected shapes: a field map
//! for validation problems, `{"detail": ...}` for everything else.

pub mod auth;
pub mod revisiones;
pub mod solicitudes;

use crate::auth::LoginThrottle;
use crate::db::store::Store;
use crate::error::AppError;
use crate::services::Services;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state for all routes.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub services: Services,
    pub throttle: Arc<LoginThrottle>,
}

// ── Error handling ───────────────────────────────────────────────────────────

pub const NOT_FOUND: &str = "Not found.";
pub const SERVER_ERROR: &str = "A server error occurred.";
pub const LOGIN_FAILED: &str = "Unable to log in with provided credentials.";

/// Wrapper to make AppError usable as an axum error response.
#[derive(Debug)]
pub struct ApiErr(pub AppError);

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}

impl IntoResponse for ApiErr {
    fn into_response(self) -> Response {
        match self.0 {
            AppError::Validation { errors } => (StatusCode::BAD_REQUEST, Json(errors)).into_response(),
            AppError::InvalidCredentials => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "non_field_errors": [LOGIN_FAILED] })),
            )
                .into_response(),
            AppError::InvalidState { message } => detail(StatusCode::BAD_REQUEST, &message),
            AppError::NotFound { .. } => detail(StatusCode::NOT_FOUND, NOT_FOUND),
            AppError::Forbidden { message } => detail(StatusCode::FORBIDDEN, &message),
            AppError::Unauthenticated { message } => {
                let mut response = detail(StatusCode::UNAUTHORIZED, &message);
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Token"));
                response
            }
            AppError::RateLimited { message } => detail(StatusCode::TOO_MANY_REQUESTS, &message),
            err @ (AppError::Database { .. } | AppError::Internal { .. }) => {
                log::error!("[api] {}", err);
                detail(StatusCode::INTERNAL_SERVER_ERROR, SERVER_ERROR)
            }
        }
    }
}

impl From<AppError> for ApiErr {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiErr {
    fn from(rejection: JsonRejection) -> Self {
        Self(AppError::invalid_state(format!(
            "JSON parse error - {}",
            rejection.body_text()
        )))
    }
}

/// Non-numeric or out-of-range ids address nothing.
impl From<PathRejection> for ApiErr {
    fn from(_: PathRejection) -> Self {
        Self(AppError::not_found("path"))
    }
}

/// Render a stored millisecond timestamp as RFC 3339 UTC.
pub(crate) fn rfc3339(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}

async fn not_found() -> Response {
    detail(StatusCode::NOT_FOUND, NOT_FOUND)
}

// ── Router ───────────────────────────────────────────────────────────────────

/// Build the application router.
pub fn build_router(state: AppState, cors_allowed_origins: &[String]) -> Router {
    let protected = Router::new()
        .route(
            "/solicitudes/",
            get(solicitudes::list).post(solicitudes::create),
        )
        .route(
            "/solicitudes/mis_solicitudes/",
            get(solicitudes::mis_solicitudes),
        )
        .route(
            "/solicitudes/{id}/",
            get(solicitudes::retrieve)
                .put(solicitudes::update)
                .patch(solicitudes::partial_update)
                .delete(solicitudes::destroy),
        )
        .route(
            "/solicitudes/{id}/add_revision/",
            post(solicitudes::add_revision),
        )
        .route(
            "/solicitudes/{id}/eliminar_finalizada/",
            delete(solicitudes::eliminar_finalizada),
        )
        .route("/revisiones/", get(revisiones::list))
        .route("/revisiones/{id}/", get(revisiones::retrieve))
        .route("/user/info/", get(auth::user_info))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    // Login happens before a token exists; the download authenticates itself
    // so it can take the token from the query string.
    let public = Router::new()
        .route("/login/", post(auth::login))
        .route(
            "/solicitudes/{id}/descargar_pdf/",
            get(solicitudes::descargar_pdf),
        );

    Router::new()
        .nest("/api/v1", protected.merge(public))
        .fallback(not_found)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_allowed_origins))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                log::warn!("[api] Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([header::CONTENT_DISPOSITION])
        .allow_credentials(true)
}
