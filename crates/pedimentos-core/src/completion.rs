//! Primary pedimento-completo request and the processor seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PedimentoError, Result};
use crate::types::PedimentoKey;

/// Body accepted by `POST /services/pedimento_completo`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryRequest {
    pub estado: i64,
    pub tipo_procesamiento: i64,
    pub pedimento: String,
    pub servicio: i64,
    pub organizacion: String,
}

impl PrimaryRequest {
    /// Trim the identifiers and reject empty strings or negative numbers.
    pub fn validated(mut self) -> Result<Self> {
        for (field, value) in [
            ("pedimento", &mut self.pedimento),
            ("organizacion", &mut self.organizacion),
        ] {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Err(PedimentoError::InvalidRequest(format!(
                    "{field} must not be empty"
                )));
            }
            *value = trimmed.to_string();
        }
        for (field, value) in [
            ("estado", self.estado),
            ("tipo_procesamiento", self.tipo_procesamiento),
            ("servicio", self.servicio),
        ] {
            if value < 0 {
                return Err(PedimentoError::InvalidRequest(format!(
                    "{field} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(self)
    }

    pub fn key(&self) -> PedimentoKey {
        PedimentoKey::new(self.organizacion.clone(), self.pedimento.clone())
    }
}

/// External subsystem that fetches and parses the complete pedimento.
///
/// Returns the raw result body; `CompletionMetadata::from_result` reads the
/// orchestration inputs out of it.
#[async_trait]
pub trait CompletionProcessor: Send + Sync {
    async fn process(&self, request: &PrimaryRequest) -> Result<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> PrimaryRequest {
        PrimaryRequest {
            estado: 1,
            tipo_procesamiento: 2,
            pedimento: "  ped-1 ".into(),
            servicio: 3,
            organizacion: "org-1".into(),
        }
    }

    #[test]
    fn validated_trims_identifiers() {
        let req = request().validated().unwrap();
        assert_eq!(req.pedimento, "ped-1");
        assert_eq!(req.key(), PedimentoKey::new("org-1", "ped-1"));
    }

    #[test]
    fn blank_organization_is_rejected() {
        let req = PrimaryRequest {
            organizacion: "   ".into(),
            ..request()
        };
        let err = req.validated().unwrap_err();
        assert!(err.to_string().contains("organizacion"));
    }

    #[test]
    fn negative_number_is_rejected() {
        let req = PrimaryRequest {
            tipo_procesamiento: -1,
            ..request()
        };
        let err = req.validated().unwrap_err();
        assert!(matches!(err, PedimentoError::InvalidRequest(_)));
        assert!(err.to_string().contains("tipo_procesamiento"));
    }

    #[test]
    fn deserializes_wire_body() {
        let req: PrimaryRequest = serde_json::from_str(
            r#"{"estado":1,"tipo_procesamiento":2,"pedimento":"p","servicio":3,"organizacion":"o"}"#,
        )
        .unwrap();
        assert_eq!(req.servicio, 3);
    }
}
