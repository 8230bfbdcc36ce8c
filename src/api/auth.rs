//! Authentication middleware, login and user info handlers.

use super::{ApiErr, AppState};
use crate::auth;
use crate::models::User;
use crate::validation;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use axum::{Extension, Json};
use serde::Serialize;
use serde_json::Value;

/// The authenticated caller, inserted by [`require_auth`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// axum middleware that resolves the token in the `Authorization` header.
///
/// Requests without a valid token are rejected with 401 before any handler
/// or policy runs.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiErr> {
    let user = auth::authenticate(state.store.as_ref(), request.headers()).await?;
    request.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(request).await)
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Handler for POST /login/.
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<TokenResponse>, ApiErr> {
    let Json(payload) = payload?;
    let credentials = validation::credentials(&payload)?;
    let token = auth::login(state.store.as_ref(), &state.throttle, credentials).await?;
    Ok(Json(TokenResponse { token }))
}

#[derive(Serialize)]
pub struct UserInfoResponse {
    pub id: i64,
    pub username: String,
    pub is_staff: bool,
    pub email: String,
}

/// Handler for GET /user/info/.
pub async fn user_info(Extension(CurrentUser(user)): Extension<CurrentUser>) -> Json<UserInfoResponse> {
    Json(UserInfoResponse {
        id: user.id,
        username: user.username,
        is_staff: user.is_staff,
        email: user.email,
    })
}
