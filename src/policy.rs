//! Access policy for solicitudes and revisiones.
//!
//! The policy is a set of synchronous predicates over an authenticated
//! [`User`]. Anonymous callers never reach it: the auth layer rejects them
//! first. Visibility failures are reported as `NotFound` so that callers
//! cannot probe for solicitudes they do not own; a visible solicitud that
//! the caller may not change yields `Forbidden`.

use crate::error::AppError;
use crate::models::{Solicitud, User};

/// Row filter applied when listing solicitudes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListScope {
    All,
    OwnedBy(i64),
}

/// Capability checks evaluated per call.
pub trait AccessPolicy: Send + Sync {
    /// Which solicitudes `user` sees in the general listing.
    fn list_scope(&self, user: &User) -> ListScope;

    /// Read access to a single solicitud.
    fn can_view(&self, user: &User, solicitud: &Solicitud) -> bool;

    /// Update, partial update and plain delete of a solicitud.
    fn can_modify(&self, user: &User, solicitud: &Solicitud) -> bool;

    /// Adding revisiones and deleting finalized solicitudes.
    fn can_review(&self, user: &User) -> bool;

    /// Read access to the revisiones resource.
    fn can_read_revisiones(&self, user: &User) -> bool;

    /// Resolve a looked-up solicitud into one `user` may see.
    fn authorize_view(
        &self,
        user: &User,
        id: i64,
        solicitud: Option<Solicitud>,
    ) -> Result<Solicitud, AppError> {
        match solicitud {
            Some(s) if self.can_view(user, &s) => Ok(s),
            _ => Err(AppError::not_found_with_id("Solicitud", id.to_string())),
        }
    }

    /// Resolve a looked-up solicitud into one `user` may change.
    fn authorize_modify(
        &self,
        user: &User,
        id: i64,
        solicitud: Option<Solicitud>,
    ) -> Result<Solicitud, AppError> {
        let solicitud = self.authorize_view(user, id, solicitud)?;
        if !self.can_modify(user, &solicitud) {
            return Err(AppError::forbidden(PERMISSION_DENIED));
        }
        Ok(solicitud)
    }

    fn require_reviewer(&self, user: &User) -> Result<(), AppError> {
        if self.can_review(user) {
            Ok(())
        } else {
            Err(AppError::forbidden(PERMISSION_DENIED))
        }
    }

    fn require_revisiones_reader(&self, user: &User) -> Result<(), AppError> {
        if self.can_read_revisiones(user) {
            Ok(())
        } else {
            Err(AppError::forbidden(PERMISSION_DENIED))
        }
    }
}

/// Message used for every policy denial.
pub const PERMISSION_DENIED: &str = "You do not have permission to perform this action.";

/// Default policy: staff read everything, owners write their own,
/// staff or reviewers review, staff read revisiones.
#[derive(Debug, Clone, Copy, Default)]
pub struct OwnershipPolicy;

impl AccessPolicy for OwnershipPolicy {
    fn list_scope(&self, user: &User) -> ListScope {
        if user.is_staff {
            ListScope::All
        } else {
            ListScope::OwnedBy(user.id)
        }
    }

    fn can_view(&self, user: &User, solicitud: &Solicitud) -> bool {
        user.is_staff || solicitud.is_owned_by(user.id)
    }

    fn can_modify(&self, user: &User, solicitud: &Solicitud) -> bool {
        solicitud.is_owned_by(user.id)
    }

    fn can_review(&self, user: &User) -> bool {
        user.is_staff || user.is_reviewer
    }

    fn can_read_revisiones(&self, user: &User) -> bool {
        user.is_staff
    }
}
