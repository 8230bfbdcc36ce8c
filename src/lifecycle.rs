//! Solicitud status transitions driven by revisiones.
//!
//! The engine is memoryless: the newest recommendation alone decides the
//! status, whatever the status was before.

use crate::error::AppError;
use crate::models::{EstadoSolicitud, Recomendacion, Solicitud};
use std::fmt;

/// Status a solicitud takes after a revision with `recomendacion`.
pub fn transition_for(recomendacion: Recomendacion) -> EstadoSolicitud {
    match recomendacion {
        Recomendacion::Aprobar => EstadoSolicitud::Aprobada,
        Recomendacion::Rechazar => EstadoSolicitud::Rechazada,
        Recomendacion::RevisionMenor | Recomendacion::RevisionMayor => EstadoSolicitud::EnRevision,
    }
}

/// Apply `recomendacion` to an in-memory solicitud and return the new status.
///
/// Only `estado` changes. Persisting it is the store's job.
pub fn apply(solicitud: &mut Solicitud, recomendacion: Recomendacion) -> EstadoSolicitud {
    let previous = solicitud.estado;
    let next = transition_for(recomendacion);
    solicitud.estado = next;

    log::info!(
        "[lifecycle] Solicitud {}: {} -> {} ({})",
        solicitud.id,
        previous,
        next,
        recomendacion
    );

    next
}

/// Configurable guard rails around the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleRules {
    /// When false, finalized solicitudes reject further revisiones.
    pub allow_review_of_finalized: bool,
}

impl Default for LifecycleRules {
    fn default() -> Self {
        Self {
            allow_review_of_finalized: true,
        }
    }
}

impl LifecycleRules {
    /// Check that `solicitud` may receive another revision.
    pub fn ensure_reviewable(&self, solicitud: &Solicitud) -> Result<(), AppError> {
        if !self.allow_review_of_finalized && solicitud.estado.is_finalizada() {
            return Err(already_finalized(solicitud.id, solicitud.estado));
        }
        Ok(())
    }
}

/// Rejection for a revision on a solicitud that is already finalized.
pub fn already_finalized(id: i64, estado: impl fmt::Display) -> AppError {
    log::warn!(
        "[lifecycle] Rejected revision of finalized solicitud {} ({})",
        id,
        estado
    );
    AppError::forbidden(format!(
        "La solicitud ya está finalizada. Estado actual: {}",
        estado
    ))
}
