//! Application error types.
//!
//! Every operation in the crate returns [`AppError`]. The variants are
//! serializable so they can be logged or returned in a structured form; the
//! HTTP layer maps them onto status codes in `api::ApiErr`.

use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Field name → list of problems, the shape returned for 400 responses.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Application-level errors.
///
/// All variants serialize to a structured JSON object.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        operation: Option<String>,
    },

    /// Input failed validation, keyed by field.
    #[error("Validation error: {}", summarize(.errors))]
    Validation { errors: FieldErrors },

    /// Requested resource not found, or not visible to the caller.
    #[error("Not found: {resource}")]
    NotFound {
        resource: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    /// Caller is authenticated but not allowed to perform the action.
    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    /// No credentials, or credentials that do not resolve to a user.
    #[error("Authentication error: {message}")]
    Unauthenticated { message: String },

    /// Login with a wrong username/password pair.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Operation not allowed in the resource's current status.
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// Too many failed login attempts.
    #[error("Rate limited: {message}")]
    RateLimited { message: String },

    /// Internal application error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

fn summarize(errors: &FieldErrors) -> String {
    errors
        .iter()
        .map(|(field, problems)| format!("{}: {}", field, problems.join(" ")))
        .collect::<Vec<_>>()
        .join("; ")
}

impl AppError {
    /// Create a database error with optional operation context.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            operation: None,
        }
    }

    /// Create a database error with operation context.
    pub fn database_with_op(message: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            operation: Some(operation.into()),
        }
    }

    /// Create a validation error from a collected field map.
    pub fn validation(errors: FieldErrors) -> Self {
        Self::Validation { errors }
    }

    /// Create a validation error for a single field.
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.into(), vec![message.into()]);
        Self::Validation { errors }
    }

    /// Create a not found error.
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: None,
        }
    }

    /// Create a not found error with ID.
    pub fn not_found_with_id(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: Some(id.into()),
        }
    }

    /// Create a forbidden error.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Create an unauthenticated error.
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated {
            message: message.into(),
        }
    }

    /// Create an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create a rate limited error.
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::RateLimited {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this is a not found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a forbidden error.
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden { .. })
    }

    /// Field errors if this is a validation error.
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            Self::Validation { errors } => Some(errors),
            _ => None,
        }
    }
}

// Conversions from common error types

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::not_found("row"),
            other => Self::database(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("JSON error: {}", err))
    }
}

impl From<crate::db::DbError> for AppError {
    fn from(err: crate::db::DbError) -> Self {
        Self::database(err.to_string())
    }
}
