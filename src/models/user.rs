//! User account model.

use serde::Serialize;
use sqlx::FromRow;

/// An authenticated account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    /// Staff see every solicitud and may list revisiones.
    pub is_staff: bool,
    /// Holds the reviewer capability (may add revisiones).
    pub is_reviewer: bool,
}

/// A user row together with its password hash, used only during login.
#[derive(Debug, Clone, FromRow)]
pub struct StoredUser {
    #[sqlx(flatten)]
    pub user: User,
    /// Argon2 PHC string.
    pub password_hash: String,
}

/// Input for creating an account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub is_staff: bool,
    pub is_reviewer: bool,
}
