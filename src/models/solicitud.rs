//! Solicitud (request) model.

use super::revision::Revision;
use super::ParseChoiceError;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

/// Lifecycle status of a solicitud.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstadoSolicitud {
    /// Initial status, no review yet.
    Pendiente,
    EnRevision,
    Aprobada,
    Rechazada,
}

impl EstadoSolicitud {
    /// Status assigned to every new solicitud.
    pub const INICIAL: Self = Self::Pendiente;

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pendiente => "pendiente",
            Self::EnRevision => "en_revision",
            Self::Aprobada => "aprobada",
            Self::Rechazada => "rechazada",
        }
    }

    /// `aprobada` or `rechazada`.
    pub fn is_finalizada(&self) -> bool {
        matches!(self, Self::Aprobada | Self::Rechazada)
    }

    /// Statuses for which a document can be generated.
    pub fn is_exportable(&self) -> bool {
        matches!(self, Self::EnRevision | Self::Aprobada | Self::Rechazada)
    }

    /// Upper-case label used in generated documents ("EN REVISION").
    pub fn label(&self) -> String {
        self.as_str().to_uppercase().replace('_', " ")
    }
}

impl FromStr for EstadoSolicitud {
    type Err = ParseChoiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pendiente" => Ok(Self::Pendiente),
            "en_revision" => Ok(Self::EnRevision),
            "aprobada" => Ok(Self::Aprobada),
            "rechazada" => Ok(Self::Rechazada),
            other => Err(ParseChoiceError::new("estado", other)),
        }
    }
}

impl TryFrom<String> for EstadoSolicitud {
    type Error = ParseChoiceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::fmt::Display for EstadoSolicitud {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of work submitted for approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TipoTrabajo {
    #[serde(rename = "ART")]
    Articulo,
    #[serde(rename = "TES_G")]
    TesisGrado,
    #[serde(rename = "TES_P")]
    TesisPosgrado,
}

impl TipoTrabajo {
    pub const ALL: [Self; 3] = [Self::Articulo, Self::TesisGrado, Self::TesisPosgrado];

    pub fn code(&self) -> &'static str {
        match self {
            Self::Articulo => "ART",
            Self::TesisGrado => "TES_G",
            Self::TesisPosgrado => "TES_P",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Articulo => "Artículo Científico",
            Self::TesisGrado => "Tesis de Grado",
            Self::TesisPosgrado => "Tesis de Posgrado",
        }
    }
}

impl FromStr for TipoTrabajo {
    type Err = ParseChoiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tipo| tipo.code() == s)
            .ok_or_else(|| ParseChoiceError::new("tipo_trabajo", s))
    }
}

impl TryFrom<String> for TipoTrabajo {
    type Error = ParseChoiceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::fmt::Display for TipoTrabajo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// A submitted work item awaiting approval.
///
/// `solicitante` is the owner's username, resolved by the store through a
/// join on `users`. `revisiones` is loaded separately, newest first.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Solicitud {
    pub id: i64,

    /// Owner user ID. Immutable after creation.
    pub solicitante_id: i64,

    /// Owner username.
    pub solicitante: String,

    pub titulo: String,

    pub resumen: String,

    #[sqlx(try_from = "String")]
    pub tipo_trabajo: TipoTrabajo,

    #[sqlx(try_from = "String")]
    pub estado: EstadoSolicitud,

    /// Creation time (Unix milliseconds). Immutable after creation.
    pub fecha_creacion: i64,

    #[sqlx(skip)]
    pub revisiones: Vec<Revision>,
}

impl Solicitud {
    /// Check whether `user_id` created this solicitud.
    pub fn is_owned_by(&self, user_id: i64) -> bool {
        self.solicitante_id == user_id
    }
}

/// Validated input for a new solicitud. Owner, status and timestamp are
/// always decided server-side.
#[derive(Debug, Clone)]
pub struct NewSolicitud {
    pub solicitante_id: i64,
    pub titulo: String,
    pub resumen: String,
    pub tipo_trabajo: TipoTrabajo,
}

/// Owner-editable fields. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct SolicitudChanges {
    pub titulo: Option<String>,
    pub resumen: Option<String>,
    pub tipo_trabajo: Option<TipoTrabajo>,
}

impl SolicitudChanges {
    pub fn is_empty(&self) -> bool {
        self.titulo.is_none() && self.resumen.is_none() && self.tipo_trabajo.is_none()
    }
}
