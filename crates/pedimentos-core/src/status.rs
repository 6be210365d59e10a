//! Progress reporting for polling clients.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::plan::OrchestrationPlan;
use crate::registry::ServiceRegistry;
use crate::types::{PedimentoKey, ServiceKind, ServiceState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub total_services: u32,
    pub completed_services: u32,
    pub in_progress_services: u32,
    pub error_services: u32,
    /// Expected services that exist but have not started yet, or do not
    /// exist at all.
    pub pending_services: u32,
    pub completion_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub exists: bool,
    pub service_id: Option<String>,
    pub estado: Option<ServiceState>,
    pub estado_nombre: Option<String>,
}

impl ServiceStatus {
    fn missing() -> Self {
        Self {
            exists: false,
            service_id: None,
            estado: None,
            estado_nombre: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub success: bool,
    pub pedimento_id: String,
    pub organizacion: String,
    pub summary: StatusSummary,
    pub services: BTreeMap<String, ServiceStatus>,
}

/// Read-only view over the registry state of one pedimento.
#[derive(Clone)]
pub struct StatusAggregator {
    registry: Arc<dyn ServiceRegistry>,
}

impl StatusAggregator {
    pub fn new(registry: Arc<dyn ServiceRegistry>) -> Self {
        Self { registry }
    }

    /// Build the progress snapshot.
    ///
    /// With a known plan only the primary service and the plan's applicable
    /// steps are expected; otherwise the four tracked kinds are. Registry
    /// errors are returned unchanged.
    pub async fn snapshot(
        &self,
        key: &PedimentoKey,
        plan: Option<&OrchestrationPlan>,
    ) -> Result<StatusReport> {
        let expected = match plan {
            Some(plan) => plan.expected_kinds(),
            None => ServiceKind::tracked().to_vec(),
        };

        let mut services = BTreeMap::new();
        let mut summary = StatusSummary {
            total_services: expected.len() as u32,
            completed_services: 0,
            in_progress_services: 0,
            error_services: 0,
            pending_services: 0,
            completion_percentage: 0.0,
        };

        for kind in expected {
            let status = match self.registry.find(key, kind).await? {
                Some(record) => {
                    match record.state {
                        ServiceState::Finished => summary.completed_services += 1,
                        ServiceState::InProgress => summary.in_progress_services += 1,
                        ServiceState::Error => summary.error_services += 1,
                        ServiceState::Created => summary.pending_services += 1,
                    }
                    ServiceStatus {
                        exists: true,
                        service_id: Some(record.id),
                        estado: Some(record.state),
                        estado_nombre: Some(record.state.name().to_string()),
                    }
                }
                None => {
                    summary.pending_services += 1;
                    ServiceStatus::missing()
                }
            };
            services.insert(kind.as_str().to_string(), status);
        }

        if summary.total_services > 0 {
            summary.completion_percentage = (f64::from(summary.completed_services) * 100.0
                / f64::from(summary.total_services)
                * 100.0)
                .round()
                / 100.0;
        }

        Ok(StatusReport {
            success: true,
            pedimento_id: key.pedimento_id.clone(),
            organizacion: key.organization_id.clone(),
            summary,
            services,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PedimentoError;
    use crate::plan::CompletionMetadata;
    use crate::registry::MemoryRegistry;
    use crate::types::ServiceRecord;
    use async_trait::async_trait;

    fn key() -> PedimentoKey {
        PedimentoKey::new("org", "ped")
    }

    struct DownRegistry;

    #[async_trait]
    impl ServiceRegistry for DownRegistry {
        async fn find(
            &self,
            _key: &PedimentoKey,
            _kind: ServiceKind,
        ) -> Result<Option<ServiceRecord>> {
            Err(PedimentoError::Registry("503 Service Unavailable".into()))
        }

        async fn create(&self, _key: &PedimentoKey, _kind: ServiceKind) -> Result<ServiceRecord> {
            Err(PedimentoError::Registry("503 Service Unavailable".into()))
        }

        async fn set_state(
            &self,
            _record: &ServiceRecord,
            _state: ServiceState,
        ) -> Result<ServiceRecord> {
            Err(PedimentoError::Registry("503 Service Unavailable".into()))
        }
    }

    #[tokio::test]
    async fn empty_registry_reports_fixed_set_with_zero_progress() {
        let agg = StatusAggregator::new(Arc::new(MemoryRegistry::new()));
        let report = agg.snapshot(&key(), None).await.unwrap();

        assert!(report.success);
        assert_eq!(report.summary.total_services, 4);
        assert_eq!(report.summary.completed_services, 0);
        assert_eq!(report.summary.completion_percentage, 0.0);
        assert_eq!(report.services.len(), 4);
        assert!(report.services.values().all(|s| !s.exists));
    }

    #[tokio::test]
    async fn counts_states_and_percentage() {
        let registry = Arc::new(MemoryRegistry::new());
        let done = registry.create(&key(), ServiceKind::PedimentoCompleto).await.unwrap();
        registry.set_state(&done, ServiceState::Finished).await.unwrap();
        let running = registry.create(&key(), ServiceKind::Partidas).await.unwrap();
        registry.set_state(&running, ServiceState::InProgress).await.unwrap();
        let failed = registry.create(&key(), ServiceKind::Remesas).await.unwrap();
        registry.set_state(&failed, ServiceState::Error).await.unwrap();

        let report = StatusAggregator::new(registry)
            .snapshot(&key(), None)
            .await
            .unwrap();

        assert_eq!(report.summary.completed_services, 1);
        assert_eq!(report.summary.in_progress_services, 1);
        assert_eq!(report.summary.error_services, 1);
        assert_eq!(report.summary.pending_services, 1);
        assert_eq!(report.summary.completion_percentage, 25.0);
        let remesas = &report.services["remesas"];
        assert_eq!(remesas.estado, Some(ServiceState::Error));
        assert_eq!(remesas.estado_nombre.as_deref(), Some("ERROR"));
    }

    #[tokio::test]
    async fn known_plan_narrows_expected_services() {
        let registry = Arc::new(MemoryRegistry::new());
        let done = registry.create(&key(), ServiceKind::PedimentoCompleto).await.unwrap();
        registry.set_state(&done, ServiceState::Finished).await.unwrap();
        let plan = OrchestrationPlan::derive(&CompletionMetadata::new(key(), 0, false));

        let report = StatusAggregator::new(registry)
            .snapshot(&key(), Some(&plan))
            .await
            .unwrap();

        assert_eq!(report.summary.total_services, 2);
        assert_eq!(report.summary.completion_percentage, 50.0);
        assert!(report.services.contains_key("acuse"));
        assert!(!report.services.contains_key("partidas"));
    }

    #[tokio::test]
    async fn percentage_is_rounded_to_two_decimals() {
        let registry = Arc::new(MemoryRegistry::new());
        let done = registry.create(&key(), ServiceKind::PedimentoCompleto).await.unwrap();
        registry.set_state(&done, ServiceState::Finished).await.unwrap();
        let plan = OrchestrationPlan::derive(&CompletionMetadata::new(key(), 1, false));

        let report = StatusAggregator::new(registry)
            .snapshot(&key(), Some(&plan))
            .await
            .unwrap();

        assert_eq!(report.summary.total_services, 3);
        assert_eq!(report.summary.completion_percentage, 33.33);
    }

    #[tokio::test]
    async fn snapshot_is_idempotent() {
        let registry = Arc::new(MemoryRegistry::new());
        let rec = registry.create(&key(), ServiceKind::Acuse).await.unwrap();
        registry.set_state(&rec, ServiceState::InProgress).await.unwrap();
        let agg = StatusAggregator::new(registry);

        let first = agg.snapshot(&key(), None).await.unwrap();
        let second = agg.snapshot(&key(), None).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[tokio::test]
    async fn registry_failure_is_surfaced() {
        let agg = StatusAggregator::new(Arc::new(DownRegistry));
        let err = agg.snapshot(&key(), None).await.unwrap_err();
        assert!(matches!(err, PedimentoError::Registry(_)));
    }

    #[tokio::test]
    async fn report_serializes_state_codes() {
        let registry = Arc::new(MemoryRegistry::new());
        let rec = registry.create(&key(), ServiceKind::Acuse).await.unwrap();
        registry.set_state(&rec, ServiceState::Finished).await.unwrap();

        let report = StatusAggregator::new(registry)
            .snapshot(&key(), None)
            .await
            .unwrap();
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["organizacion"], "org");
        assert_eq!(json["services"]["acuse"]["estado"], 3);
        assert_eq!(json["services"]["acuse"]["estado_nombre"], "FINALIZADO");
        assert_eq!(json["services"]["partidas"]["exists"], false);
        assert!(json["services"]["partidas"]["estado"].is_null());
    }
}
