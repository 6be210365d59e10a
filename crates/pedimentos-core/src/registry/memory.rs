use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::error::{PedimentoError, Result};
use crate::types::{PedimentoKey, ServiceKind, ServiceRecord, ServiceState};

use super::ServiceRegistry;

/// In-process registry, used for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    records: Mutex<Vec<ServiceRecord>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn list(&self) -> Vec<ServiceRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl ServiceRegistry for MemoryRegistry {
    async fn find(&self, key: &PedimentoKey, kind: ServiceKind) -> Result<Option<ServiceRecord>> {
        let records = self.records.lock().await;
        Ok(records
            .iter()
            .find(|r| {
                r.organization_id == key.organization_id
                    && r.pedimento_id == key.pedimento_id
                    && r.kind == kind
            })
            .cloned())
    }

    async fn create(&self, key: &PedimentoKey, kind: ServiceKind) -> Result<ServiceRecord> {
        let mut records = self.records.lock().await;
        let exists = records.iter().any(|r| {
            r.organization_id == key.organization_id
                && r.pedimento_id == key.pedimento_id
                && r.kind == kind
        });
        if exists {
            return Err(PedimentoError::ServiceExists {
                kind: kind.to_string(),
                pedimento: key.pedimento_id.clone(),
            });
        }
        let record = ServiceRecord::new(key, kind);
        records.push(record.clone());
        Ok(record)
    }

    async fn set_state(
        &self,
        record: &ServiceRecord,
        state: ServiceState,
    ) -> Result<ServiceRecord> {
        let mut records = self.records.lock().await;
        let stored = records
            .iter_mut()
            .find(|r| r.id == record.id)
            .ok_or_else(|| PedimentoError::ServiceNotFound {
                kind: record.kind.to_string(),
                pedimento: record.pedimento_id.clone(),
            })?;
        stored.state = state;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> PedimentoKey {
        PedimentoKey::new("org", "ped")
    }

    #[tokio::test]
    async fn create_then_find() {
        let reg = MemoryRegistry::new();
        let created = reg.create(&key(), ServiceKind::Partidas).await.unwrap();
        assert_eq!(created.state, ServiceState::Created);

        let found = reg.find(&key(), ServiceKind::Partidas).await.unwrap();
        assert_eq!(found, Some(created));
        assert!(reg.find(&key(), ServiceKind::Acuse).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let reg = MemoryRegistry::new();
        reg.create(&key(), ServiceKind::Acuse).await.unwrap();
        let err = reg.create(&key(), ServiceKind::Acuse).await.unwrap_err();
        assert!(matches!(err, PedimentoError::ServiceExists { .. }));
    }

    #[tokio::test]
    async fn set_state_persists_transition() {
        let reg = MemoryRegistry::new();
        let rec = reg.create(&key(), ServiceKind::Remesas).await.unwrap();
        let updated = reg.set_state(&rec, ServiceState::InProgress).await.unwrap();
        assert_eq!(updated.state, ServiceState::InProgress);
        assert!(updated.updated_at >= rec.updated_at);

        let found = reg.find(&key(), ServiceKind::Remesas).await.unwrap().unwrap();
        assert_eq!(found.state, ServiceState::InProgress);
    }

    #[tokio::test]
    async fn set_state_on_unknown_record_fails() {
        let reg = MemoryRegistry::new();
        let ghost = ServiceRecord::new(&key(), ServiceKind::Acuse);
        let err = reg.set_state(&ghost, ServiceState::Finished).await.unwrap_err();
        assert!(matches!(err, PedimentoError::ServiceNotFound { .. }));
    }

    #[tokio::test]
    async fn find_or_create_reuses_existing() {
        let reg = MemoryRegistry::new();
        let first = reg
            .find_or_create(&key(), ServiceKind::PedimentoCompleto, 2)
            .await
            .unwrap();
        let second = reg
            .find_or_create(&key(), ServiceKind::PedimentoCompleto, 2)
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(reg.list().await.len(), 1);
    }
}
