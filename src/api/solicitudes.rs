//! Solicitud routes, including review submission and the PDF download.

use super::auth::CurrentUser;
use super::revisiones::{RevisionResponse, RevisionSummaryResponse};
use super::{rfc3339, ApiErr, AppState, NOT_FOUND};
use crate::auth::{self, Actor};
use crate::error::AppError;
use crate::models::{EstadoSolicitud, RevisionSummary, Solicitud, TipoTrabajo, User};
use crate::services::export::{NOT_AUTHORIZED, RENDER_FAILED};
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A solicitud with its revisiones, newest first.
#[derive(Debug, Serialize)]
pub struct SolicitudResponse {
    pub id: i64,
    pub solicitante: String,
    pub titulo: String,
    pub resumen: String,
    pub tipo_trabajo: TipoTrabajo,
    pub estado: EstadoSolicitud,
    pub fecha_creacion: String,
    pub revisiones: Vec<RevisionSummaryResponse>,
}

impl From<Solicitud> for SolicitudResponse {
    fn from(solicitud: Solicitud) -> Self {
        let revisiones = solicitud
            .revisiones
            .iter()
            .map(|r| RevisionSummaryResponse::from(RevisionSummary::from(r)))
            .collect();

        Self {
            id: solicitud.id,
            solicitante: solicitud.solicitante,
            titulo: solicitud.titulo,
            resumen: solicitud.resumen,
            tipo_trabajo: solicitud.tipo_trabajo,
            estado: solicitud.estado,
            fecha_creacion: rfc3339(solicitud.fecha_creacion),
            revisiones,
        }
    }
}

fn to_responses(solicitudes: Vec<Solicitud>) -> Json<Vec<SolicitudResponse>> {
    Json(solicitudes.into_iter().map(SolicitudResponse::from).collect())
}

/// Handler for GET /solicitudes/.
pub async fn list(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<Vec<SolicitudResponse>>, ApiErr> {
    let solicitudes = state.services.solicitudes.list(&user).await?;
    Ok(to_responses(solicitudes))
}

/// Handler for GET /solicitudes/mis_solicitudes/.
pub async fn mis_solicitudes(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<Vec<SolicitudResponse>>, ApiErr> {
    let solicitudes = state.services.solicitudes.mis_solicitudes(&user).await?;
    Ok(to_responses(solicitudes))
}

/// Handler for POST /solicitudes/.
pub async fn create(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<SolicitudResponse>), ApiErr> {
    let Json(payload) = payload?;
    let solicitud = state.services.solicitudes.create(&user, &payload).await?;
    Ok((StatusCode::CREATED, Json(solicitud.into())))
}

/// Handler for GET /solicitudes/{id}/.
pub async fn retrieve(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<SolicitudResponse>, ApiErr> {
    let Path(id) = path?;
    let solicitud = state.services.solicitudes.retrieve(&user, id).await?;
    Ok(Json(solicitud.into()))
}

async fn apply_update(
    state: AppState,
    user: &User,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<Value>, JsonRejection>,
    partial: bool,
) -> Result<Json<SolicitudResponse>, ApiErr> {
    let Path(id) = path?;
    let Json(payload) = payload?;
    let solicitud = state
        .services
        .solicitudes
        .update(user, id, &payload, partial)
        .await?;
    Ok(Json(solicitud.into()))
}

/// Handler for PUT /solicitudes/{id}/.
pub async fn update(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<SolicitudResponse>, ApiErr> {
    apply_update(state, &user, path, payload, false).await
}

/// Handler for PATCH /solicitudes/{id}/.
pub async fn partial_update(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<SolicitudResponse>, ApiErr> {
    apply_update(state, &user, path, payload, true).await
}

/// Handler for DELETE /solicitudes/{id}/.
pub async fn destroy(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ApiErr> {
    let Path(id) = path?;
    state.services.solicitudes.destroy(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for POST /solicitudes/{id}/add_revision/.
pub async fn add_revision(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<RevisionResponse>), ApiErr> {
    let Path(id) = path?;
    let Json(payload) = payload?;
    let revision = state.services.revisiones.create(&user, id, &payload).await?;
    Ok((StatusCode::CREATED, Json(revision.into())))
}

/// Handler for DELETE /solicitudes/{id}/eliminar_finalizada/.
pub async fn eliminar_finalizada(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ApiErr> {
    let Path(id) = path?;
    state.services.solicitudes.eliminar_finalizada(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── PDF download ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub auth_token: Option<String>,
}

fn plain(status: StatusCode, message: impl Into<String>) -> Response {
    (status, message.into()).into_response()
}

/// Handler for GET /solicitudes/{id}/descargar_pdf/.
///
/// Meant for direct browser navigation, so the token may come in the
/// `auth_token` query parameter instead of a header, and errors are plain
/// text. An unknown token counts as anonymous; an empty `auth_token`
/// falls back to the header.
pub async fn descargar_pdf(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    Query(query): Query<DownloadQuery>,
    headers: HeaderMap,
) -> Response {
    // An empty query value counts as absent.
    let key = match query.auth_token.filter(|key| !key.is_empty()) {
        Some(key) => Some(key),
        None => auth::token_from_headers(&headers).ok().flatten(),
    };

    let actor = match auth::resolve_actor(state.store.as_ref(), key.as_deref()).await {
        Ok(actor) => actor,
        Err(e) => {
            log::error!("[export] Token lookup failed: {}", e);
            return plain(StatusCode::INTERNAL_SERVER_ERROR, RENDER_FAILED);
        }
    };

    if actor == Actor::Anonymous {
        return plain(StatusCode::FORBIDDEN, NOT_AUTHORIZED);
    }

    let Ok(Path(id)) = path else {
        return plain(StatusCode::NOT_FOUND, NOT_FOUND);
    };

    let document = match state.services.export.export(&actor, id).await {
        Ok(document) => document,
        Err(AppError::Unauthenticated { .. }) => {
            return plain(StatusCode::FORBIDDEN, NOT_AUTHORIZED)
        }
        Err(AppError::NotFound { .. }) => return plain(StatusCode::NOT_FOUND, NOT_FOUND),
        Err(AppError::Forbidden { message }) => return plain(StatusCode::FORBIDDEN, message),
        Err(e) => {
            log::error!("[export] Download of solicitud {} failed: {}", id, e);
            return plain(StatusCode::INTERNAL_SERVER_ERROR, RENDER_FAILED);
        }
    };

    let Ok(disposition) = HeaderValue::from_str(&document.content_disposition) else {
        log::error!(
            "[export] Unusable Content-Disposition {:?}",
            document.content_disposition
        );
        return plain(StatusCode::INTERNAL_SERVER_ERROR, RENDER_FAILED);
    };

    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(document.content_type)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        document.bytes,
    )
        .into_response()
}
