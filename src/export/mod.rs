//! Document export for solicitudes.
//!
//! A [`DocumentContext`] is a flat, display-ready snapshot of a solicitud.
//! Renderers turn it into bytes; the HTTP layer attaches the filename from
//! [`content_disposition`].

pub mod pdf;

use crate::models::{RevisionSummary, Solicitud};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Rendering failures. Never shown to clients verbatim.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("PDF error: {0}")]
    Pdf(String),
}

/// Turns a solicitud snapshot into a document.
pub trait DocumentRenderer: Send + Sync {
    /// MIME type of the produced bytes.
    fn content_type(&self) -> &'static str;

    /// File extension without the dot.
    fn extension(&self) -> &'static str;

    fn render(&self, context: &DocumentContext) -> Result<Vec<u8>, RenderError>;
}

/// A finished document ready to be sent.
#[derive(Debug, Clone)]
pub struct ExportedDocument {
    pub content_disposition: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RevisionContext {
    pub revisor: String,
    pub recomendacion: String,
    pub comentarios: String,
    pub fecha_revision: String,
}

/// Values available to document templates.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentContext {
    pub id: i64,
    pub titulo: String,
    pub resumen: String,
    pub tipo_trabajo: String,
    pub estado: String,
    pub solicitante: String,
    pub fecha_creacion: String,
    /// Newest first.
    pub revisiones: Vec<RevisionContext>,
    pub generado: String,
}

impl DocumentContext {
    pub fn new(solicitud: &Solicitud, generated_at: DateTime<Utc>) -> Self {
        let revisiones = solicitud
            .revisiones
            .iter()
            .map(RevisionSummary::from)
            .map(|summary| RevisionContext {
                revisor: summary.revisor,
                recomendacion: summary.recomendacion.label().to_string(),
                comentarios: summary.comentarios,
                fecha_revision: format_millis(summary.fecha_revision),
            })
            .collect();

        Self {
            id: solicitud.id,
            titulo: solicitud.titulo.clone(),
            resumen: solicitud.resumen.clone(),
            tipo_trabajo: solicitud.tipo_trabajo.label().to_string(),
            estado: solicitud.estado.label(),
            solicitante: solicitud.solicitante.clone(),
            fecha_creacion: format_millis(solicitud.fecha_creacion),
            revisiones,
            generado: generated_at.format(DISPLAY_FORMAT).to_string(),
        }
    }
}

const DISPLAY_FORMAT: &str = "%d/%m/%Y %H:%M UTC";

fn format_millis(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|dt| dt.format(DISPLAY_FORMAT).to_string())
        .unwrap_or_default()
}

/// Characters of the title kept in the filename.
const FILENAME_TITLE_CHARS: usize = 20;

/// Preferred download name: `Solicitud_{id}_{first 20 title chars}.{ext}`
/// with spaces replaced by underscores.
pub fn suggested_filename(id: i64, titulo: &str, extension: &str) -> String {
    let short: String = titulo
        .chars()
        .take(FILENAME_TITLE_CHARS)
        .collect::<String>()
        .replace(' ', "_");
    format!("Solicitud_{}_{}.{}", id, short, extension)
}

fn is_header_safe(name: &str) -> bool {
    name.chars()
        .all(|c| c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\')
}

/// `Content-Disposition` value for a download.
///
/// Titles that cannot appear in a quoted header value fall back to
/// `Solicitud_{id}.{ext}`, with the full name carried in `filename*`.
pub fn content_disposition(id: i64, titulo: &str, extension: &str) -> String {
    let preferred = suggested_filename(id, titulo, extension);
    if is_header_safe(&preferred) {
        return format!("attachment; filename=\"{}\"", preferred);
    }

    format!(
        "attachment; filename=\"Solicitud_{}.{}\"; filename*=UTF-8''{}",
        id,
        extension,
        urlencoding::encode(&preferred)
    )
}
