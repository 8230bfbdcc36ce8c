//! Data models for the application.
//!
//! These models represent the entities stored in the SQLite database.
//! Row types derive `FromRow` for SQLx queries; choice fields are stored as
//! their string codes and parsed on load.

pub mod revision;
pub mod solicitud;
pub mod user;

// Re-exports for convenient access
pub use revision::{NewRevision, Recomendacion, Revision, RevisionSummary};
pub use solicitud::{EstadoSolicitud, NewSolicitud, Solicitud, SolicitudChanges, TipoTrabajo};
pub use user::{NewUser, StoredUser, User};

use thiserror::Error;

/// A stored or submitted code that is not one of the allowed choices.
#[derive(Debug, Clone, Error)]
#[error("\"{value}\" is not a valid choice.")]
pub struct ParseChoiceError {
    pub field: &'static str,
    pub value: String,
}

impl ParseChoiceError {
    pub fn new(field: &'static str, value: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
        }
    }
}
