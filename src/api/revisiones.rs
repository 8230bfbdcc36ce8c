//! Read-only revision routes and the revision response shapes.

use super::auth::CurrentUser;
use super::{rfc3339, ApiErr, AppState};
use crate::models::{Recomendacion, Revision, RevisionSummary};
use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Serialize;

/// A full revision record.
#[derive(Debug, Serialize)]
pub struct RevisionResponse {
    pub id: i64,
    pub solicitud: i64,
    pub revisor: String,
    pub recomendacion: Recomendacion,
    pub comentarios: String,
    pub fecha_revision: String,
}

impl From<Revision> for RevisionResponse {
    fn from(revision: Revision) -> Self {
        Self {
            id: revision.id,
            solicitud: revision.solicitud_id,
            revisor: revision.revisor,
            recomendacion: revision.recomendacion,
            comentarios: revision.comentarios,
            fecha_revision: rfc3339(revision.fecha_revision),
        }
    }
}

/// A revision as nested inside a solicitud.
#[derive(Debug, Serialize)]
pub struct RevisionSummaryResponse {
    pub revisor: String,
    pub recomendacion: Recomendacion,
    pub comentarios: String,
    pub fecha_revision: String,
}

impl From<RevisionSummary> for RevisionSummaryResponse {
    fn from(summary: RevisionSummary) -> Self {
        Self {
            revisor: summary.revisor,
            recomendacion: summary.recomendacion,
            comentarios: summary.comentarios,
            fecha_revision: rfc3339(summary.fecha_revision),
        }
    }
}

/// Handler for GET /revisiones/.
pub async fn list(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<Vec<RevisionResponse>>, ApiErr> {
    let revisiones = state.services.revisiones.list(&user).await?;
    Ok(Json(revisiones.into_iter().map(RevisionResponse::from).collect()))
}

/// Handler for GET /revisiones/{id}/.
pub async fn retrieve(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<RevisionResponse>, ApiErr> {
    let Path(id) = path?;
    let revision = state.services.revisiones.retrieve(&user, id).await?;
    Ok(Json(revision.into()))
}
