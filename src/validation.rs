//! Request payload validation.
//!
//! Payloads arrive as raw JSON so that every field problem can be reported
//! at once, keyed by field name. Fields the client may not set (`estado`,
//! `solicitante`, `fecha_creacion`, `id`, `revisiones`, `revisor`,
//! `solicitud`) are ignored rather than rejected.

use crate::error::{AppError, FieldErrors};
use crate::models::{Recomendacion, SolicitudChanges, TipoTrabajo};
use serde_json::{Map, Value};
use std::str::FromStr;

pub const REQUIRED: &str = "This field is required.";
pub const BLANK: &str = "This field may not be blank.";
pub const NULL: &str = "This field may not be null.";
pub const NOT_A_STRING: &str = "Not a valid string.";

/// Maximum length of `titulo`, in characters.
pub const TITULO_MAX_LENGTH: usize = 200;

/// Whether absent fields are errors (create / full update) or skipped
/// (partial update).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Full,
    Partial,
}

/// Every writable solicitud field, as required on create and full update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolicitudFields {
    pub titulo: String,
    pub resumen: String,
    pub tipo_trabajo: TipoTrabajo,
}

impl From<SolicitudFields> for SolicitudChanges {
    fn from(fields: SolicitudFields) -> Self {
        Self {
            titulo: Some(fields.titulo),
            resumen: Some(fields.resumen),
            tipo_trabajo: Some(fields.tipo_trabajo),
        }
    }
}

/// Validated revision payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionFields {
    pub recomendacion: Recomendacion,
    pub comentarios: String,
}

/// Validated login payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Collects per-field problems while reading a JSON object.
struct FieldReader<'a> {
    object: &'a Map<String, Value>,
    mode: Mode,
    errors: FieldErrors,
}

struct TextRule {
    allow_blank: bool,
    trim: bool,
    max_length: Option<usize>,
}

impl TextRule {
    const REQUIRED_TEXT: Self = Self {
        allow_blank: false,
        trim: true,
        max_length: None,
    };
}

impl<'a> FieldReader<'a> {
    fn new(payload: &'a Value, mode: Mode) -> Result<Self, AppError> {
        match payload {
            Value::Object(object) => Ok(Self {
                object,
                mode,
                errors: FieldErrors::new(),
            }),
            other => Err(AppError::invalid_field(
                "non_field_errors",
                format!(
                    "Invalid data. Expected a dictionary, but got {}.",
                    json_type_name(other)
                ),
            )),
        }
    }

    fn fail(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    /// Raw value of `field`, recording "required" when absent in full mode.
    fn present(&mut self, field: &str) -> Option<&'a Value> {
        match self.object.get(field) {
            Some(value) => Some(value),
            None => {
                if self.mode == Mode::Full {
                    self.fail(field, REQUIRED);
                }
                None
            }
        }
    }

    fn text(&mut self, field: &str, rule: TextRule) -> Option<String> {
        let value = self.present(field)?;

        let raw = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Null => {
                self.fail(field, NULL);
                return None;
            }
            _ => {
                self.fail(field, NOT_A_STRING);
                return None;
            }
        };

        let text = if rule.trim {
            raw.trim().to_string()
        } else {
            raw
        };

        if text.is_empty() && !rule.allow_blank {
            self.fail(field, BLANK);
            return None;
        }

        if let Some(max) = rule.max_length {
            if text.chars().count() > max {
                self.fail(
                    field,
                    format!("Ensure this field has no more than {} characters.", max),
                );
                return None;
            }
        }

        Some(text)
    }

    fn choice<T: FromStr>(&mut self, field: &str) -> Option<T>
    where
        T::Err: std::fmt::Display,
    {
        let value = self.present(field)?;

        let code = match value {
            Value::String(s) => s.clone(),
            Value::Null => {
                self.fail(field, NULL);
                return None;
            }
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            other => other.to_string(),
        };

        match code.parse::<T>() {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                self.fail(field, e.to_string());
                None
            }
        }
    }

    fn finish(self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::validation(self.errors))
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "NoneType",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

fn read_solicitud(payload: &Value, mode: Mode) -> Result<SolicitudChanges, AppError> {
    let mut reader = FieldReader::new(payload, mode)?;

    let titulo = reader.text(
        "titulo",
        TextRule {
            max_length: Some(TITULO_MAX_LENGTH),
            ..TextRule::REQUIRED_TEXT
        },
    );
    let resumen = reader.text("resumen", TextRule::REQUIRED_TEXT);
    let tipo_trabajo = reader.choice::<TipoTrabajo>("tipo_trabajo");

    reader.finish()?;

    Ok(SolicitudChanges {
        titulo,
        resumen,
        tipo_trabajo,
    })
}

/// Validate a create or full-update payload.
pub fn solicitud_fields(payload: &Value) -> Result<SolicitudFields, AppError> {
    match read_solicitud(payload, Mode::Full)? {
        SolicitudChanges {
            titulo: Some(titulo),
            resumen: Some(resumen),
            tipo_trabajo: Some(tipo_trabajo),
        } => Ok(SolicitudFields {
            titulo,
            resumen,
            tipo_trabajo,
        }),
        _ => Err(AppError::internal("incomplete solicitud after validation")),
    }
}

/// Validate a partial-update payload. Only the fields present are checked.
pub fn solicitud_changes(payload: &Value) -> Result<SolicitudChanges, AppError> {
    read_solicitud(payload, Mode::Partial)
}

/// Validate a revision payload.
pub fn revision_fields(payload: &Value) -> Result<RevisionFields, AppError> {
    let mut reader = FieldReader::new(payload, Mode::Partial)?;

    // `recomendacion` is the only required field.
    let recomendacion = match reader.object.get("recomendacion") {
        Some(_) => reader.choice::<Recomendacion>("recomendacion"),
        None => {
            reader.fail("recomendacion", REQUIRED);
            None
        }
    };
    let comentarios = reader
        .text(
            "comentarios",
            TextRule {
                allow_blank: true,
                ..TextRule::REQUIRED_TEXT
            },
        )
        .unwrap_or_default();

    reader.finish()?;

    match recomendacion {
        Some(recomendacion) => Ok(RevisionFields {
            recomendacion,
            comentarios,
        }),
        None => Err(AppError::internal("missing recomendacion after validation")),
    }
}

/// Validate a login payload. Passwords are taken verbatim.
pub fn credentials(payload: &Value) -> Result<Credentials, AppError> {
    let mut reader = FieldReader::new(payload, Mode::Full)?;

    let username = reader.text("username", TextRule::REQUIRED_TEXT);
    let password = reader.text(
        "password",
        TextRule {
            trim: false,
            ..TextRule::REQUIRED_TEXT
        },
    );

    reader.finish()?;

    match (username, password) {
        (Some(username), Some(password)) => Ok(Credentials { username, password }),
        _ => Err(AppError::internal("missing credentials after validation")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn errors_of(err: AppError) -> FieldErrors {
        err.field_errors().cloned().unwrap()
    }

    #[test]
    fn full_solicitud_requires_every_field() {
        let errors = errors_of(solicitud_fields(&json!({})).unwrap_err());
        assert_eq!(errors["titulo"], vec![REQUIRED]);
        assert_eq!(errors["resumen"], vec![REQUIRED]);
        assert_eq!(errors["tipo_trabajo"], vec![REQUIRED]);
    }

    #[test]
    fn full_solicitud_ignores_read_only_fields() {
        let fields = solicitud_fields(&json!({
            "titulo": "  Mi tesis ",
            "resumen": "Resumen",
            "tipo_trabajo": "TES_P",
            "estado": "aprobada",
            "solicitante": 99,
            "fecha_creacion": "2001-01-01T00:00:00Z",
        }))
        .unwrap();

        assert_eq!(fields.titulo, "Mi tesis");
        assert_eq!(fields.tipo_trabajo, TipoTrabajo::TesisPosgrado);
    }

    #[test]
    fn field_problems_are_reported_together() {
        let errors = errors_of(
            solicitud_fields(&json!({
                "titulo": "x".repeat(TITULO_MAX_LENGTH + 1),
                "resumen": "   ",
                "tipo_trabajo": "LIBRO",
            }))
            .unwrap_err(),
        );

        assert_eq!(
            errors["titulo"],
            vec!["Ensure this field has no more than 200 characters."]
        );
        assert_eq!(errors["resumen"], vec![BLANK]);
        assert_eq!(errors["tipo_trabajo"], vec!["\"LIBRO\" is not a valid choice."]);
    }

    #[test]
    fn titulo_length_counts_characters() {
        let titulo = "á".repeat(TITULO_MAX_LENGTH);
        let fields = solicitud_fields(&json!({
            "titulo": titulo,
            "resumen": "r",
            "tipo_trabajo": "ART",
        }))
        .unwrap();
        assert_eq!(fields.titulo.chars().count(), TITULO_MAX_LENGTH);
    }

    #[test]
    fn null_and_non_string_values() {
        let errors = errors_of(
            solicitud_fields(&json!({
                "titulo": null,
                "resumen": ["a"],
                "tipo_trabajo": null,
            }))
            .unwrap_err(),
        );
        assert_eq!(errors["titulo"], vec![NULL]);
        assert_eq!(errors["resumen"], vec![NOT_A_STRING]);
        assert_eq!(errors["tipo_trabajo"], vec![NULL]);
    }

    #[test]
    fn partial_checks_only_present_fields() {
        let changes = solicitud_changes(&json!({ "resumen": "Nuevo" })).unwrap();
        assert_eq!(changes.resumen.as_deref(), Some("Nuevo"));
        assert!(changes.titulo.is_none());
        assert!(changes.tipo_trabajo.is_none());

        let errors = errors_of(solicitud_changes(&json!({ "titulo": "" })).unwrap_err());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors["titulo"], vec![BLANK]);
    }

    #[test]
    fn non_object_payload() {
        let errors = errors_of(solicitud_fields(&json!(["titulo"])).unwrap_err());
        assert_eq!(
            errors["non_field_errors"],
            vec!["Invalid data. Expected a dictionary, but got list."]
        );
    }

    #[test]
    fn revision_defaults_comentarios() {
        let fields = revision_fields(&json!({ "recomendacion": "RMEN" })).unwrap();
        assert_eq!(fields.recomendacion, Recomendacion::RevisionMenor);
        assert_eq!(fields.comentarios, "");
    }

    #[test]
    fn revision_ignores_solicitud_and_revisor() {
        let fields = revision_fields(&json!({
            "recomendacion": "APR",
            "comentarios": "Bien",
            "solicitud": 999,
            "revisor": "otro",
        }))
        .unwrap();
        assert_eq!(fields.recomendacion, Recomendacion::Aprobar);
        assert_eq!(fields.comentarios, "Bien");
    }

    #[test]
    fn revision_rejects_unknown_code() {
        let errors = errors_of(revision_fields(&json!({ "recomendacion": "MAYBE" })).unwrap_err());
        assert_eq!(errors["recomendacion"], vec!["\"MAYBE\" is not a valid choice."]);

        let errors = errors_of(revision_fields(&json!({})).unwrap_err());
        assert_eq!(errors["recomendacion"], vec![REQUIRED]);
    }

    #[test]
    fn credentials_keep_password_whitespace() {
        let creds = credentials(&json!({ "username": " ana ", "password": " secreto " })).unwrap();
        assert_eq!(creds.username, "ana");
        assert_eq!(creds.password, " secreto ");

        let errors = errors_of(credentials(&json!({ "username": "ana" })).unwrap_err());
        assert_eq!(errors["password"], vec![REQUIRED]);
    }
}
