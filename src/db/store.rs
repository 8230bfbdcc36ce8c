//! Repository interface over the database.
//!
//! Services talk to storage only through [`Store`], so the persistence
//! engine can be swapped or faked. [`SqliteStore`] is the production
//! implementation on top of the sqlx pool.

use crate::db::pool::DbPool;
use crate::error::AppError;
use crate::models::{
    EstadoSolicitud, NewRevision, NewSolicitud, NewUser, Revision, Solicitud, SolicitudChanges,
    StoredUser, User,
};
use crate::policy::ListScope;
use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite};
use std::collections::HashMap;

/// Persistence operations needed by the services and the auth layer.
#[async_trait]
pub trait Store: Send + Sync {
    /// Create an account. Fails with a validation error on a taken username.
    async fn create_user(&self, input: NewUser) -> Result<User, AppError>;

    /// Look up a user and its password hash by username.
    async fn find_credentials(&self, username: &str) -> Result<Option<StoredUser>, AppError>;

    /// Resolve an API token to its user.
    async fn user_for_token(&self, key: &str) -> Result<Option<User>, AppError>;

    /// Return the user's token, creating it on first use.
    async fn get_or_create_token(&self, user_id: i64) -> Result<String, AppError>;

    /// Solicitudes within `scope`, newest first, with their revisiones.
    async fn list_solicitudes(&self, scope: ListScope) -> Result<Vec<Solicitud>, AppError>;

    /// A single solicitud with its revisiones.
    async fn get_solicitud(&self, id: i64) -> Result<Option<Solicitud>, AppError>;

    async fn insert_solicitud(&self, input: NewSolicitud) -> Result<Solicitud, AppError>;

    /// Apply owner-editable changes. Owner, status and creation time are
    /// never touched here.
    async fn update_solicitud(
        &self,
        id: i64,
        changes: SolicitudChanges,
    ) -> Result<Solicitud, AppError>;

    /// Delete a solicitud and, by cascade, its revisiones. Returns whether a
    /// row was removed.
    async fn delete_solicitud(&self, id: i64) -> Result<bool, AppError>;

    /// Store a revision and set the parent's status in one transaction.
    ///
    /// Unless `allow_finalized` is set, a parent that is already `aprobada`
    /// or `rechazada` when the transaction runs is left untouched and the
    /// call fails with `Forbidden`.
    async fn insert_revision(
        &self,
        input: NewRevision,
        estado: EstadoSolicitud,
        allow_finalized: bool,
    ) -> Result<Revision, AppError>;

    async fn list_revisiones(&self) -> Result<Vec<Revision>, AppError>;

    async fn get_revision(&self, id: i64) -> Result<Option<Revision>, AppError>;
}

const SOLICITUD_SELECT: &str = r#"
    SELECT s.id, s.solicitante_id, u.username AS solicitante, s.titulo, s.resumen,
           s.tipo_trabajo, s.estado, s.fecha_creacion
    FROM solicitudes s
    JOIN users u ON u.id = s.solicitante_id
"#;

const REVISION_SELECT: &str = r#"
    SELECT r.id, r.solicitud_id, r.revisor_id, u.username AS revisor, r.recomendacion,
           r.comentarios, r.fecha_revision
    FROM revisiones r
    JOIN users u ON u.id = r.revisor_id
"#;

const USER_COLUMNS: &str = "id, username, email, is_staff, is_reviewer";

/// Current time in Unix milliseconds.
fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Which solicitudes a revision lookup covers.
#[derive(Debug, Clone, Copy)]
enum ParentFilter {
    Scope(ListScope),
    Solicitud(i64),
}

/// SQLite-backed [`Store`].
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Load the revisiones of every solicitud selected by `parent` in one
    /// query and attach them, newest first.
    ///
    /// The parent filter is repeated as a subquery so the number of bound
    /// parameters does not grow with the number of solicitudes.
    async fn attach_revisiones(
        &self,
        solicitudes: &mut [Solicitud],
        parent: ParentFilter,
    ) -> Result<(), AppError> {
        if solicitudes.is_empty() {
            return Ok(());
        }

        let mut query = QueryBuilder::<Sqlite>::new(REVISION_SELECT);
        match parent {
            ParentFilter::Scope(ListScope::All) => {}
            ParentFilter::Scope(ListScope::OwnedBy(user_id)) => {
                query.push(
                    " WHERE r.solicitud_id IN (SELECT id FROM solicitudes WHERE solicitante_id = ",
                );
                query.push_bind(user_id);
                query.push(")");
            }
            ParentFilter::Solicitud(id) => {
                query.push(" WHERE r.solicitud_id = ");
                query.push_bind(id);
            }
        }
        query.push(" ORDER BY r.fecha_revision DESC, r.id DESC");

        let revisiones: Vec<Revision> = query.build_query_as().fetch_all(&self.pool).await?;

        let mut by_solicitud: HashMap<i64, Vec<Revision>> = HashMap::new();
        for revision in revisiones {
            by_solicitud
                .entry(revision.solicitud_id)
                .or_default()
                .push(revision);
        }

        for solicitud in solicitudes.iter_mut() {
            solicitud.revisiones = by_solicitud.remove(&solicitud.id).unwrap_or_default();
        }

        Ok(())
    }

    async fn require_solicitud(&self, id: i64) -> Result<Solicitud, AppError> {
        self.get_solicitud(id)
            .await?
            .ok_or_else(|| AppError::not_found_with_id("Solicitud", id.to_string()))
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_user(&self, input: NewUser) -> Result<User, AppError> {
        let result = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, email, password_hash, is_staff, is_reviewer)
            VALUES (?, ?, ?, ?, ?)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&input.username)
        .bind(&input.email)
        .bind(&input.password_hash)
        .bind(input.is_staff)
        .bind(input.is_reviewer)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(user) => Ok(user),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(
                AppError::invalid_field("username", "A user with that username already exists."),
            ),
            Err(e) => Err(AppError::database_with_op(e.to_string(), "create_user")),
        }
    }

    async fn find_credentials(&self, username: &str) -> Result<Option<StoredUser>, AppError> {
        let user = sqlx::query_as::<_, StoredUser>(&format!(
            "SELECT {USER_COLUMNS}, password_hash FROM users WHERE username = ?"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn user_for_token(&self, key: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT u.id, u.username, u.email, u.is_staff, u.is_reviewer
            FROM auth_tokens t
            JOIN users u ON u.id = t.user_id
            WHERE t.key = ?
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn get_or_create_token(&self, user_id: i64) -> Result<String, AppError> {
        let key = uuid::Uuid::new_v4().simple().to_string();

        sqlx::query(
            "INSERT INTO auth_tokens (key, user_id, created) VALUES (?, ?, ?) ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(&key)
        .bind(user_id)
        .bind(now_millis())
        .execute(&self.pool)
        .await?;

        let stored: String = sqlx::query_scalar("SELECT key FROM auth_tokens WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(stored)
    }

    async fn list_solicitudes(&self, scope: ListScope) -> Result<Vec<Solicitud>, AppError> {
        let mut query = QueryBuilder::<Sqlite>::new(SOLICITUD_SELECT);
        if let ListScope::OwnedBy(user_id) = scope {
            query.push(" WHERE s.solicitante_id = ");
            query.push_bind(user_id);
        }
        query.push(" ORDER BY s.fecha_creacion DESC, s.id DESC");

        let mut solicitudes: Vec<Solicitud> = query.build_query_as().fetch_all(&self.pool).await?;
        self.attach_revisiones(&mut solicitudes, ParentFilter::Scope(scope))
            .await?;

        Ok(solicitudes)
    }

    async fn get_solicitud(&self, id: i64) -> Result<Option<Solicitud>, AppError> {
        let solicitud: Option<Solicitud> =
            sqlx::query_as(&format!("{SOLICITUD_SELECT} WHERE s.id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        match solicitud {
            Some(s) => {
                let mut found = [s];
                self.attach_revisiones(&mut found, ParentFilter::Solicitud(id))
                    .await?;
                let [s] = found;
                Ok(Some(s))
            }
            None => Ok(None),
        }
    }

    async fn insert_solicitud(&self, input: NewSolicitud) -> Result<Solicitud, AppError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO solicitudes (solicitante_id, titulo, resumen, tipo_trabajo, estado, fecha_creacion)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(input.solicitante_id)
        .bind(&input.titulo)
        .bind(&input.resumen)
        .bind(input.tipo_trabajo.code())
        .bind(EstadoSolicitud::INICIAL.as_str())
        .bind(now_millis())
        .fetch_one(&self.pool)
        .await?;

        self.require_solicitud(id).await
    }

    async fn update_solicitud(
        &self,
        id: i64,
        changes: SolicitudChanges,
    ) -> Result<Solicitud, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE solicitudes
            SET titulo = COALESCE(?, titulo),
                resumen = COALESCE(?, resumen),
                tipo_trabajo = COALESCE(?, tipo_trabajo)
            WHERE id = ?
            "#,
        )
        .bind(changes.titulo.as_deref())
        .bind(changes.resumen.as_deref())
        .bind(changes.tipo_trabajo.map(|t| t.code()))
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found_with_id("Solicitud", id.to_string()));
        }

        self.require_solicitud(id).await
    }

    async fn delete_solicitud(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM solicitudes WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_revision(
        &self,
        input: NewRevision,
        estado: EstadoSolicitud,
        allow_finalized: bool,
    ) -> Result<Revision, AppError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE solicitudes SET estado = ?
            WHERE id = ? AND (? OR estado NOT IN ('aprobada', 'rechazada'))
            "#,
        )
        .bind(estado.as_str())
        .bind(input.solicitud_id)
        .bind(allow_finalized)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            // Dropping the transaction rolls it back.
            let current: Option<String> =
                sqlx::query_scalar("SELECT estado FROM solicitudes WHERE id = ?")
                    .bind(input.solicitud_id)
                    .fetch_optional(&mut *tx)
                    .await?;

            return Err(match current {
                Some(current) => crate::lifecycle::already_finalized(input.solicitud_id, &current),
                None => AppError::not_found_with_id("Solicitud", input.solicitud_id.to_string()),
            });
        }

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO revisiones (solicitud_id, revisor_id, recomendacion, comentarios, fecha_revision)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(input.solicitud_id)
        .bind(input.revisor_id)
        .bind(input.recomendacion.code())
        .bind(&input.comentarios)
        .bind(now_millis())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        self.get_revision(id)
            .await?
            .ok_or_else(|| AppError::not_found_with_id("Revision", id.to_string()))
    }

    async fn list_revisiones(&self) -> Result<Vec<Revision>, AppError> {
        let revisiones = sqlx::query_as::<_, Revision>(&format!(
            "{REVISION_SELECT} ORDER BY r.fecha_revision DESC, r.id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(revisiones)
    }

    async fn get_revision(&self, id: i64) -> Result<Option<Revision>, AppError> {
        let revision = sqlx::query_as::<_, Revision>(&format!("{REVISION_SELECT} WHERE r.id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(revision)
    }
}
