//! Revision operations. Creating a revision drives the solicitud lifecycle.

use crate::db::store::Store;
use crate::error::AppError;
use crate::lifecycle::{self, LifecycleRules};
use crate::models::{NewRevision, Revision, User};
use crate::policy::AccessPolicy;
use crate::validation;
use serde_json::Value;
use std::sync::Arc;

#[derive(Clone)]
pub struct RevisionService {
    store: Arc<dyn Store>,
    policy: Arc<dyn AccessPolicy>,
    rules: LifecycleRules,
}

impl RevisionService {
    pub fn new(store: Arc<dyn Store>, policy: Arc<dyn AccessPolicy>, rules: LifecycleRules) -> Self {
        Self {
            store,
            policy,
            rules,
        }
    }

    /// Add a revision to solicitud `solicitud_id` and move it to the status
    /// the recommendation maps to.
    ///
    /// The solicitud and reviewer always come from the route and the caller,
    /// never from the payload.
    pub async fn create(
        &self,
        user: &User,
        solicitud_id: i64,
        payload: &Value,
    ) -> Result<Revision, AppError> {
        self.policy.require_reviewer(user)?;

        let found = self.store.get_solicitud(solicitud_id).await?;
        let mut solicitud = self.policy.authorize_view(user, solicitud_id, found)?;
        self.rules.ensure_reviewable(&solicitud)?;

        let fields = validation::revision_fields(payload)?;
        let estado = lifecycle::apply(&mut solicitud, fields.recomendacion);

        let revision = self
            .store
            .insert_revision(
                NewRevision {
                    solicitud_id: solicitud.id,
                    revisor_id: user.id,
                    recomendacion: fields.recomendacion,
                    comentarios: fields.comentarios,
                },
                estado,
                self.rules.allow_review_of_finalized,
            )
            .await?;

        log::info!(
            "[revisiones] {} reviewed solicitud {} with {}",
            user.username,
            solicitud.id,
            revision.recomendacion
        );
        Ok(revision)
    }

    pub async fn list(&self, user: &User) -> Result<Vec<Revision>, AppError> {
        self.policy.require_revisiones_reader(user)?;
        self.store.list_revisiones().await
    }

    pub async fn retrieve(&self, user: &User, id: i64) -> Result<Revision, AppError> {
        self.policy.require_revisiones_reader(user)?;
        self.store
            .get_revision(id)
            .await?
            .ok_or_else(|| AppError::not_found_with_id("Revision", id.to_string()))
    }
}
