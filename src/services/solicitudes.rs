//! Solicitud operations: listing, CRUD and deletion of finalized requests.

use crate::db::store::Store;
use crate::error::AppError;
use crate::models::{NewSolicitud, Solicitud, User};
use crate::policy::{AccessPolicy, ListScope};
use crate::validation;
use serde_json::Value;
use std::sync::Arc;

pub const ONLY_FINALIZED_DELETABLE: &str =
    "Solo se pueden eliminar solicitudes en estado \"aprobada\" o \"rechazada\".";

#[derive(Clone)]
pub struct SolicitudService {
    store: Arc<dyn Store>,
    policy: Arc<dyn AccessPolicy>,
}

impl SolicitudService {
    pub fn new(store: Arc<dyn Store>, policy: Arc<dyn AccessPolicy>) -> Self {
        Self { store, policy }
    }

    /// Solicitudes visible to `user`, newest first.
    pub async fn list(&self, user: &User) -> Result<Vec<Solicitud>, AppError> {
        self.store.list_solicitudes(self.policy.list_scope(user)).await
    }

    /// The caller's own solicitudes, staff included.
    pub async fn mis_solicitudes(&self, user: &User) -> Result<Vec<Solicitud>, AppError> {
        self.store.list_solicitudes(ListScope::OwnedBy(user.id)).await
    }

    /// Create a solicitud owned by `user` in the initial status.
    pub async fn create(&self, user: &User, payload: &Value) -> Result<Solicitud, AppError> {
        let fields = validation::solicitud_fields(payload)?;

        let solicitud = self
            .store
            .insert_solicitud(NewSolicitud {
                solicitante_id: user.id,
                titulo: fields.titulo,
                resumen: fields.resumen,
                tipo_trabajo: fields.tipo_trabajo,
            })
            .await?;

        log::info!(
            "[solicitudes] {} created solicitud {}",
            user.username,
            solicitud.id
        );
        Ok(solicitud)
    }

    pub async fn retrieve(&self, user: &User, id: i64) -> Result<Solicitud, AppError> {
        let found = self.store.get_solicitud(id).await?;
        self.policy.authorize_view(user, id, found)
    }

    /// Full (`partial == false`) or partial update of the writable fields.
    pub async fn update(
        &self,
        user: &User,
        id: i64,
        payload: &Value,
        partial: bool,
    ) -> Result<Solicitud, AppError> {
        let found = self.store.get_solicitud(id).await?;
        let current = self.policy.authorize_modify(user, id, found)?;

        let changes = if partial {
            validation::solicitud_changes(payload)?
        } else {
            validation::solicitud_fields(payload)?.into()
        };

        if changes.is_empty() {
            return Ok(current);
        }

        self.store.update_solicitud(id, changes).await
    }

    /// Owner deletion, in any status.
    pub async fn destroy(&self, user: &User, id: i64) -> Result<(), AppError> {
        let found = self.store.get_solicitud(id).await?;
        self.policy.authorize_modify(user, id, found)?;

        self.delete(id).await?;
        log::info!("[solicitudes] {} deleted solicitud {}", user.username, id);
        Ok(())
    }

    /// Reviewer deletion, allowed only once the solicitud is finalized.
    pub async fn eliminar_finalizada(&self, user: &User, id: i64) -> Result<(), AppError> {
        self.policy.require_reviewer(user)?;

        let found = self.store.get_solicitud(id).await?;
        let solicitud = self.policy.authorize_view(user, id, found)?;

        if !solicitud.estado.is_finalizada() {
            return Err(AppError::invalid_state(ONLY_FINALIZED_DELETABLE));
        }

        self.delete(id).await?;
        log::info!(
            "[solicitudes] {} deleted finalized solicitud {} ({})",
            user.username,
            id,
            solicitud.estado
        );
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), AppError> {
        if self.store.delete_solicitud(id).await? {
            Ok(())
        } else {
            Err(AppError::not_found_with_id("Solicitud", id.to_string()))
        }
    }
}
