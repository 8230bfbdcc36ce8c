//! Revision (review) model.

use super::ParseChoiceError;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

/// Reviewer verdict code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recomendacion {
    /// Approve.
    #[serde(rename = "APR")]
    Aprobar,
    /// Reject.
    #[serde(rename = "RECH")]
    Rechazar,
    /// Minor revision, keeps the solicitud in review.
    #[serde(rename = "RMEN")]
    RevisionMenor,
    /// Major revision, keeps the solicitud in review.
    #[serde(rename = "RMAY")]
    RevisionMayor,
}

impl Recomendacion {
    pub const ALL: [Self; 4] = [
        Self::Aprobar,
        Self::Rechazar,
        Self::RevisionMenor,
        Self::RevisionMayor,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Self::Aprobar => "APR",
            Self::Rechazar => "RECH",
            Self::RevisionMenor => "RMEN",
            Self::RevisionMayor => "RMAY",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Aprobar => "Aprobar",
            Self::Rechazar => "Rechazar",
            Self::RevisionMenor => "Revisión Menor",
            Self::RevisionMayor => "Revisión Mayor",
        }
    }
}

impl FromStr for Recomendacion {
    type Err = ParseChoiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|rec| rec.code() == s)
            .ok_or_else(|| ParseChoiceError::new("recomendacion", s))
    }
}

impl TryFrom<String> for Recomendacion {
    type Error = ParseChoiceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::fmt::Display for Recomendacion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// A reviewer judgment attached to a solicitud. Never updated once stored.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Revision {
    pub id: i64,

    /// Parent solicitud ID.
    pub solicitud_id: i64,

    /// Reviewer user ID.
    pub revisor_id: i64,

    /// Reviewer username.
    pub revisor: String,

    #[sqlx(try_from = "String")]
    pub recomendacion: Recomendacion,

    pub comentarios: String,

    /// Review time (Unix milliseconds), server-assigned.
    pub fecha_revision: i64,
}

/// Reduced projection of a revision for display inside a solicitud.
///
/// Carries no back-reference to the solicitud and is never addressed on its
/// own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevisionSummary {
    pub revisor: String,
    pub recomendacion: Recomendacion,
    pub comentarios: String,
    pub fecha_revision: i64,
}

impl From<&Revision> for RevisionSummary {
    fn from(revision: &Revision) -> Self {
        Self {
            revisor: revision.revisor.clone(),
            recomendacion: revision.recomendacion,
            comentarios: revision.comentarios.clone(),
            fecha_revision: revision.fecha_revision,
        }
    }
}

/// Validated input for a new revision.
#[derive(Debug, Clone)]
pub struct NewRevision {
    pub solicitud_id: i64,
    pub revisor_id: i64,
    pub recomendacion: Recomendacion,
    pub comentarios: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recomendacion_codes() {
        assert_eq!("APR".parse::<Recomendacion>().unwrap(), Recomendacion::Aprobar);
        assert_eq!("RECH".parse::<Recomendacion>().unwrap(), Recomendacion::Rechazar);
        assert_eq!("RMEN".parse::<Recomendacion>().unwrap(), Recomendacion::RevisionMenor);
        assert_eq!("RMAY".parse::<Recomendacion>().unwrap(), Recomendacion::RevisionMayor);
        assert!("apr".parse::<Recomendacion>().is_err());
    }

    #[test]
    fn test_recomendacion_serializes_as_code() {
        let json = serde_json::to_string(&Recomendacion::RevisionMayor).unwrap();
        assert_eq!(json, "\"RMAY\"");
    }

    #[test]
    fn test_summary_drops_ids() {
        let revision = Revision {
            id: 7,
            solicitud_id: 3,
            revisor_id: 2,
            revisor: "revisora".into(),
            recomendacion: Recomendacion::Aprobar,
            comentarios: "Bien".into(),
            fecha_revision: 1_700_000_000_000,
        };
        let summary = RevisionSummary::from(&revision);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["revisor"], "revisora");
        assert_eq!(json["recomendacion"], "APR");
        assert!(json.get("solicitud_id").is_none());
        assert!(json.get("id").is_none());
    }
}
