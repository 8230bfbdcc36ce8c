//! Document export of a single solicitud.

use crate::auth::Actor;
use crate::db::store::Store;
use crate::error::AppError;
use crate::export::{content_disposition, DocumentContext, DocumentRenderer, ExportedDocument};
use crate::policy::AccessPolicy;
use std::sync::Arc;
use std::time::Duration;

pub const NOT_AUTHORIZED: &str = "No autorizado.";
pub const RENDER_FAILED: &str = "Error interno al generar el PDF.";

#[derive(Clone)]
pub struct ExportService {
    store: Arc<dyn Store>,
    policy: Arc<dyn AccessPolicy>,
    renderer: Arc<dyn DocumentRenderer>,
    timeout: Duration,
}

impl ExportService {
    pub fn new(
        store: Arc<dyn Store>,
        policy: Arc<dyn AccessPolicy>,
        renderer: Arc<dyn DocumentRenderer>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            policy,
            renderer,
            timeout,
        }
    }

    /// Render solicitud `id` for download.
    ///
    /// Anonymous callers get `Unauthenticated`, invisible or missing
    /// solicitudes `NotFound`, and statuses without a document `Forbidden`
    /// naming the current status.
    pub async fn export(&self, actor: &Actor, id: i64) -> Result<ExportedDocument, AppError> {
        let user = actor
            .user()
            .ok_or_else(|| AppError::unauthenticated(NOT_AUTHORIZED))?;

        let found = self.store.get_solicitud(id).await?;
        let solicitud = self.policy.authorize_view(user, id, found)?;

        if !solicitud.estado.is_exportable() {
            return Err(AppError::forbidden(format!(
                "La descarga solo está permitida para solicitudes en estado finalizado o en revisión. Estado actual: {}",
                solicitud.estado
            )));
        }

        let context = DocumentContext::new(&solicitud, chrono::Utc::now());
        let renderer = self.renderer.clone();
        let task = tokio::task::spawn_blocking(move || renderer.render(&context));

        let bytes = match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(Ok(bytes))) => bytes,
            Ok(Ok(Err(e))) => {
                log::error!("[export] Rendering solicitud {} failed: {}", id, e);
                return Err(AppError::internal(RENDER_FAILED));
            }
            Ok(Err(e)) => {
                log::error!("[export] Render task for solicitud {} panicked: {}", id, e);
                return Err(AppError::internal(RENDER_FAILED));
            }
            Err(_) => {
                log::error!(
                    "[export] Rendering solicitud {} timed out after {:?}",
                    id,
                    self.timeout
                );
                return Err(AppError::internal(RENDER_FAILED));
            }
        };

        log::info!(
            "[export] {} exported solicitud {} ({} bytes)",
            user.username,
            id,
            bytes.len()
        );

        Ok(ExportedDocument {
            content_disposition: content_disposition(
                solicitud.id,
                &solicitud.titulo,
                self.renderer.extension(),
            ),
            content_type: self.renderer.content_type(),
            bytes,
        })
    }
}
