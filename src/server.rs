//! HTTP server bootstrap and lifecycle.
//!
//! [`bootstrap`] opens the database and wires the services; [`start_server`]
//! binds the listener and serves the router on a background task until the
//! handle is shut down.

use crate::api::{build_router, AppState};
use crate::auth::{self, LoginThrottle};
use crate::config::Settings;
use crate::db;
use crate::db::store::{SqliteStore, Store};
use crate::error::AppError;
use crate::export::pdf::PdfRenderer;
use crate::lifecycle::LifecycleRules;
use crate::models::{NewUser, User};
use crate::policy::OwnershipPolicy;
use crate::services::Services;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How often stale login-throttle entries are dropped.
const THROTTLE_PRUNE_INTERVAL: Duration = Duration::from_secs(300);

/// Open storage and build the shared application state.
pub async fn bootstrap(settings: &Settings) -> Result<AppState, AppError> {
    let pool = db::initialize(&settings.database.path, settings.database.max_connections).await?;
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));

    let renderer = PdfRenderer::new()
        .map_err(|e| AppError::internal(format!("Failed to load document template: {}", e)))?;

    let services = Services::new(
        store.clone(),
        Arc::new(OwnershipPolicy),
        LifecycleRules {
            allow_review_of_finalized: settings.lifecycle.allow_review_of_finalized,
        },
        Arc::new(renderer),
        settings.export.render_timeout(),
    );

    Ok(AppState {
        store,
        services,
        throttle: Arc::new(LoginThrottle::new()),
    })
}

/// Handle to control the running server.
pub struct ServerHandle {
    cancel_token: CancellationToken,
    addr: SocketAddr,
    join: JoinHandle<()>,
}

impl ServerHandle {
    /// The address actually bound (useful with port 0).
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections and wait for in-flight requests.
    pub async fn shutdown(self) {
        log::info!("[server] Stopping server on {}", self.addr);
        self.cancel_token.cancel();
        if let Err(e) = self.join.await {
            log::error!("[server] Server task failed: {}", e);
        }
    }
}

/// Start the HTTP server.
///
/// Returns once the listener is bound. The server runs on a spawned task
/// until [`ServerHandle::shutdown`] is called.
pub async fn start_server(settings: &Settings, state: AppState) -> Result<ServerHandle, AppError> {
    let listener = tokio::net::TcpListener::bind(&settings.server.bind)
        .await
        .map_err(|e| {
            AppError::internal(format!(
                "Failed to bind to {}: {}",
                settings.server.bind, e
            ))
        })?;
    let addr = listener
        .local_addr()
        .map_err(|e| AppError::internal(format!("Failed to read bound address: {}", e)))?;

    let cancel_token = CancellationToken::new();
    let server_cancel = cancel_token.clone();
    let prune_cancel = cancel_token.clone();

    let throttle = state.throttle.clone();
    let app = build_router(state, &settings.server.cors_allowed_origins);

    log::info!("[server] Listening on http://{}", addr);

    tokio::spawn(async move {
        prune_throttle(throttle, prune_cancel).await;
    });

    let join = tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            server_cancel.cancelled().await;
        });

        if let Err(e) = server.await {
            log::error!("[server] Server error: {}", e);
        }

        log::info!("[server] Server stopped");
    });

    Ok(ServerHandle {
        cancel_token,
        addr,
        join,
    })
}

async fn prune_throttle(throttle: Arc<LoginThrottle>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(THROTTLE_PRUNE_INTERVAL);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => throttle.prune().await,
        }
    }
}

/// Create an account with a freshly hashed password.
pub async fn create_user(
    state: &AppState,
    username: &str,
    email: &str,
    password: &str,
    is_staff: bool,
    is_reviewer: bool,
) -> Result<User, AppError> {
    let password_hash = auth::hash_password(password)?;
    let user = state
        .store
        .create_user(NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password_hash,
            is_staff,
            is_reviewer,
        })
        .await?;

    log::info!(
        "[server] Created user {} (staff: {}, reviewer: {})",
        user.username,
        user.is_staff,
        user.is_reviewer
    );
    Ok(user)
}
