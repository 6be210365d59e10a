//! Derivation of the post-completion plan.
//!
//! A completed pedimento fans out into up to three dependent services, always
//! considered in the order partidas → remesas → acuse. Applicability is fixed
//! at derivation time from the primary service's output metadata.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{PedimentoKey, ServiceKind};

/// Fixed execution order of the dependent services.
pub const STEP_ORDER: [ServiceKind; 3] =
    [ServiceKind::Partidas, ServiceKind::Remesas, ServiceKind::Acuse];

// ---------------------------------------------------------------------------
// CompletionMetadata
// ---------------------------------------------------------------------------

/// What the primary pedimento-completo service reports about the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionMetadata {
    #[serde(flatten)]
    pub key: PedimentoKey,
    /// Highest `partidas` number found in the document. May be zero or
    /// negative when the document carries none.
    pub item_count: i64,
    /// Whether the document carries consolidated-remittance identifiers.
    pub remittances: bool,
}

impl CompletionMetadata {
    pub fn new(key: PedimentoKey, item_count: i64, remittances: bool) -> Self {
        Self {
            key,
            item_count,
            remittances,
        }
    }

    /// Extract the metadata from the primary service's result body.
    ///
    /// Reads `xml_content.numero_partidas` (integer, numeric string, or null)
    /// and `xml_content.remesas` (bool or number). Anything missing or
    /// unreadable counts as "nothing to do".
    pub fn from_result(key: PedimentoKey, result: &Value) -> Self {
        let content = result.get("xml_content").unwrap_or(&Value::Null);

        let item_count = match content.get("numero_partidas") {
            Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
            _ => 0,
        };

        let remittances = match content.get("remesas") {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
            _ => false,
        };

        Self::new(key, item_count, remittances)
    }
}

// ---------------------------------------------------------------------------
// OrchestrationPlan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub kind: ServiceKind,
    pub applicable: bool,
}

/// Ordered, conditional list of dependent services for one pedimento.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestrationPlan {
    #[serde(flatten)]
    pub key: PedimentoKey,
    pub steps: Vec<PlanStep>,
}

impl OrchestrationPlan {
    /// Derive the plan. Never fails: partidas needs `item_count > 0`, remesas
    /// needs the remittance flag, acuse is always present (its service no-ops
    /// when there are no digitized documents).
    pub fn derive(meta: &CompletionMetadata) -> Self {
        let steps = STEP_ORDER
            .iter()
            .map(|&kind| PlanStep {
                kind,
                applicable: match kind {
                    ServiceKind::Partidas => meta.item_count > 0,
                    ServiceKind::Remesas => meta.remittances,
                    _ => true,
                },
            })
            .collect();

        Self {
            key: meta.key.clone(),
            steps,
        }
    }

    pub fn applicable_steps(&self) -> impl Iterator<Item = ServiceKind> + '_ {
        self.steps.iter().filter(|s| s.applicable).map(|s| s.kind)
    }

    pub fn is_applicable(&self, kind: ServiceKind) -> bool {
        self.steps.iter().any(|s| s.kind == kind && s.applicable)
    }

    /// Kinds whose records make up this pedimento's progress: the primary
    /// service plus every applicable step.
    pub fn expected_kinds(&self) -> Vec<ServiceKind> {
        std::iter::once(ServiceKind::PedimentoCompleto)
            .chain(self.applicable_steps())
            .collect()
    }
}
