use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::PedimentoError;

// ---------------------------------------------------------------------------
// ServiceKind
// ---------------------------------------------------------------------------

/// The kind of work a service record tracks.
///
/// Numeric codes match the `servicio` field of the customs backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    PedimentoCompleto,
    Partidas,
    Remesas,
    Acuse,
    EstadoPedimento,
    Edocument,
}

impl ServiceKind {
    pub fn all() -> &'static [ServiceKind] {
        &[
            ServiceKind::PedimentoCompleto,
            ServiceKind::Partidas,
            ServiceKind::Remesas,
            ServiceKind::Acuse,
            ServiceKind::EstadoPedimento,
            ServiceKind::Edocument,
        ]
    }

    /// Kinds reported by the status endpoint when no plan is known.
    pub fn tracked() -> &'static [ServiceKind] {
        &[
            ServiceKind::PedimentoCompleto,
            ServiceKind::Partidas,
            ServiceKind::Remesas,
            ServiceKind::Acuse,
        ]
    }

    pub fn code(self) -> u8 {
        match self {
            ServiceKind::PedimentoCompleto => 3,
            ServiceKind::Partidas => 4,
            ServiceKind::Remesas => 5,
            ServiceKind::Acuse => 6,
            ServiceKind::EstadoPedimento => 7,
            ServiceKind::Edocument => 8,
        }
    }

    pub fn from_code(code: i64) -> Result<Self, PedimentoError> {
        ServiceKind::all()
            .iter()
            .copied()
            .find(|k| i64::from(k.code()) == code)
            .ok_or_else(|| PedimentoError::InvalidServiceKind(code.to_string()))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ServiceKind::PedimentoCompleto => "pedimento_completo",
            ServiceKind::Partidas => "partidas",
            ServiceKind::Remesas => "remesas",
            ServiceKind::Acuse => "acuse",
            ServiceKind::EstadoPedimento => "estado_pedimento",
            ServiceKind::Edocument => "edocument",
        }
    }

    /// Path segment of the dependent-service endpoint, for kinds the
    /// orchestrator drives (`POST /services/<segment>`).
    pub fn endpoint(self) -> Option<&'static str> {
        match self {
            ServiceKind::Partidas => Some("partidas"),
            ServiceKind::Remesas => Some("remesas"),
            ServiceKind::Acuse => Some("acuse"),
            _ => None,
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ServiceKind {
    type Err = PedimentoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ServiceKind::all()
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| PedimentoError::InvalidServiceKind(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// ServiceState
// ---------------------------------------------------------------------------

/// Lifecycle state of a service record.
///
/// Transitions: `Created → InProgress → Finished | Error`. `Finished` and
/// `Error` are terminal. Serialized as the backend's integer `estado` code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum ServiceState {
    Created,
    InProgress,
    Finished,
    Error,
}

impl ServiceState {
    pub fn code(self) -> u8 {
        match self {
            ServiceState::Created => 1,
            ServiceState::InProgress => 2,
            ServiceState::Finished => 3,
            ServiceState::Error => 4,
        }
    }

    pub fn from_code(code: i64) -> Result<Self, PedimentoError> {
        match code {
            1 => Ok(ServiceState::Created),
            2 => Ok(ServiceState::InProgress),
            3 => Ok(ServiceState::Finished),
            4 => Ok(ServiceState::Error),
            other => Err(PedimentoError::InvalidStateCode(other)),
        }
    }

    /// Name exposed as `estado_nombre`.
    pub fn name(self) -> &'static str {
        match self {
            ServiceState::Created => "CREADO",
            ServiceState::InProgress => "EN_PROCESO",
            ServiceState::Finished => "FINALIZADO",
            ServiceState::Error => "ERROR",
        }
    }
}

impl TryFrom<i64> for ServiceState {
    type Error = PedimentoError;

    fn try_from(code: i64) -> Result<Self, PedimentoError> {
        ServiceState::from_code(code)
    }
}

impl From<ServiceState> for i64 {
    fn from(state: ServiceState) -> i64 {
        i64::from(state.code())
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// PedimentoKey
// ---------------------------------------------------------------------------

/// Correlation keys shared by every record of one workflow instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PedimentoKey {
    pub organization_id: String,
    pub pedimento_id: String,
}

impl PedimentoKey {
    pub fn new(organization_id: impl Into<String>, pedimento_id: impl Into<String>) -> Self {
        Self {
            organization_id: organization_id.into(),
            pedimento_id: pedimento_id.into(),
        }
    }
}

impl fmt::Display for PedimentoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.organization_id, self.pedimento_id)
    }
}

// ---------------------------------------------------------------------------
// ServiceRecord
// ---------------------------------------------------------------------------

/// Snapshot of one schedulable unit of work, as stored by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub id: String,
    pub organization_id: String,
    pub pedimento_id: String,
    pub kind: ServiceKind,
    pub state: ServiceState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceRecord {
    /// Build a fresh `Created` record with a locally generated id.
    pub fn new(key: &PedimentoKey, kind: ServiceKind) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            organization_id: key.organization_id.clone(),
            pedimento_id: key.pedimento_id.clone(),
            kind,
            state: ServiceState::Created,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> PedimentoKey {
        PedimentoKey::new(&self.organization_id, &self.pedimento_id)
    }
}
