//! Business logic services.
//!
//! Each service holds its collaborators (store, access policy, renderer)
//! behind trait objects and is independent of the HTTP layer. Handlers pass
//! the authenticated [`User`](crate::models::User) and the raw payload.

pub mod export;
pub mod revisiones;
pub mod solicitudes;

pub use export::ExportService;
pub use revisiones::RevisionService;
pub use solicitudes::SolicitudService;

use crate::db::store::Store;
use crate::export::DocumentRenderer;
use crate::lifecycle::LifecycleRules;
use crate::policy::AccessPolicy;
use std::sync::Arc;
use std::time::Duration;

/// The full set of services sharing one store and policy.
#[derive(Clone)]
pub struct Services {
    pub solicitudes: SolicitudService,
    pub revisiones: RevisionService,
    pub export: ExportService,
}

impl Services {
    pub fn new(
        store: Arc<dyn Store>,
        policy: Arc<dyn AccessPolicy>,
        rules: LifecycleRules,
        renderer: Arc<dyn DocumentRenderer>,
        render_timeout: Duration,
    ) -> Self {
        Self {
            solicitudes: SolicitudService::new(store.clone(), policy.clone()),
            revisiones: RevisionService::new(store.clone(), policy.clone(), rules),
            export: ExportService::new(store, policy, renderer, render_timeout),
        }
    }
}
