//! File-backed registry using redb.
//!
//! # Table design
//!
//! A single `SERVICE_RECORDS` table keyed by the tuple
//! `(organization_id, pedimento_id, kind code)` with the JSON-encoded
//! `ServiceRecord` as value. The composite key makes the one-record-per-tuple
//! invariant structural: a second `create` for the same tuple finds the
//! existing key. Ids are stored as separate key components, so no separator
//! character can make two tuples collide.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition};
use tracing::info;

use crate::error::{PedimentoError, Result};
use crate::types::{PedimentoKey, ServiceKind, ServiceRecord, ServiceState};

use super::ServiceRegistry;

type RecordKey<'a> = (&'a str, &'a str, u8);

const SERVICE_RECORDS: TableDefinition<(&str, &str, u8), &[u8]> =
    TableDefinition::new("service_records");

fn record_key(key: &PedimentoKey, kind: ServiceKind) -> RecordKey<'_> {
    (
        key.organization_id.as_str(),
        key.pedimento_id.as_str(),
        kind.code(),
    )
}

fn store_err(e: impl std::fmt::Display) -> PedimentoError {
    PedimentoError::LocalStore(e.to_string())
}

/// Persistent registry for deployments without the customs REST backend.
#[derive(Clone)]
pub struct LocalRegistry {
    db: Arc<Database>,
}

impl LocalRegistry {
    /// Open or create the database at `path`, creating parent directories
    /// and the table if needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(store_err)?;
        let wt = db.begin_write().map_err(store_err)?;
        wt.open_table(SERVICE_RECORDS).map_err(store_err)?;
        wt.commit().map_err(store_err)?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn get(&self, key: &PedimentoKey, kind: ServiceKind) -> Result<Option<ServiceRecord>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(SERVICE_RECORDS).map_err(store_err)?;
        let value = table.get(record_key(key, kind)).map_err(store_err)?;
        let record: Option<ServiceRecord> = match value {
            Some(v) => Some(serde_json::from_slice(v.value())?),
            None => None,
        };
        Ok(record.filter(|r| r.kind == kind && r.key() == *key))
    }

    pub fn insert_new(&self, key: &PedimentoKey, kind: ServiceKind) -> Result<ServiceRecord> {
        let k = record_key(key, kind);
        let record = ServiceRecord::new(key, kind);
        let value = serde_json::to_vec(&record)?;

        let wt = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = wt.open_table(SERVICE_RECORDS).map_err(store_err)?;
            let exists = table.get(k).map_err(store_err)?.is_some();
            if exists {
                return Err(PedimentoError::ServiceExists {
                    kind: kind.to_string(),
                    pedimento: key.pedimento_id.clone(),
                });
            }
            table.insert(k, value.as_slice()).map_err(store_err)?;
        }
        wt.commit().map_err(store_err)?;
        Ok(record)
    }

    pub fn update_state(&self, record: &ServiceRecord, state: ServiceState) -> Result<ServiceRecord> {
        let owner = record.key();
        let k = record_key(&owner, record.kind);

        let wt = self.db.begin_write().map_err(store_err)?;
        let updated = {
            let mut table = wt.open_table(SERVICE_RECORDS).map_err(store_err)?;
            let current: Option<ServiceRecord> = match table.get(k).map_err(store_err)? {
                Some(v) => Some(serde_json::from_slice(v.value())?),
                None => None,
            };
            let mut stored = current
                .filter(|r| r.id == record.id)
                .ok_or_else(|| PedimentoError::ServiceNotFound {
                    kind: record.kind.to_string(),
                    pedimento: record.pedimento_id.clone(),
                })?;
            stored.state = state;
            stored.updated_at = Utc::now();
            let value = serde_json::to_vec(&stored)?;
            table.insert(k, value.as_slice()).map_err(store_err)?;
            stored
        };
        wt.commit().map_err(store_err)?;
        Ok(updated)
    }

    pub fn list_all(&self) -> Result<Vec<ServiceRecord>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(SERVICE_RECORDS).map_err(store_err)?;

        let mut result = Vec::new();
        for entry in table.iter().map_err(store_err)? {
            let (_, v) = entry.map_err(store_err)?;
            let record: ServiceRecord = serde_json::from_slice(v.value())?;
            result.push(record);
        }
        Ok(result)
    }

    /// On startup, mark records stuck `InProgress` for longer than `max_age`
    /// as `Error`: the orchestration that owned them did not survive the
    /// restart.
    ///
    /// Returns the number of records recovered.
    pub fn startup_recovery(&self, max_age: Duration) -> Result<u32> {
        let cutoff = Utc::now() - chrono::Duration::from_std(max_age).map_err(store_err)?;

        let mut count = 0u32;
        for record in self.list_all()? {
            if record.state == ServiceState::InProgress && record.updated_at < cutoff {
                self.update_state(&record, ServiceState::Error)?;
                count += 1;
            }
        }
        if count > 0 {
            info!(count, "marked interrupted service records as ERROR");
        }
        Ok(count)
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(LocalRegistry) -> Result<T> + Send + 'static,
    {
        let this = self.clone();
        tokio::task::spawn_blocking(move || f(this))
            .await
            .map_err(store_err)?
    }
}

#[async_trait]
impl ServiceRegistry for LocalRegistry {
    async fn find(&self, key: &PedimentoKey, kind: ServiceKind) -> Result<Option<ServiceRecord>> {
        let key = key.clone();
        self.blocking(move |reg| reg.get(&key, kind)).await
    }

    async fn create(&self, key: &PedimentoKey, kind: ServiceKind) -> Result<ServiceRecord> {
        let key = key.clone();
        self.blocking(move |reg| reg.insert_new(&key, kind)).await
    }

    async fn set_state(
        &self,
        record: &ServiceRecord,
        state: ServiceState,
    ) -> Result<ServiceRecord> {
        let record = record.clone();
        self.blocking(move |reg| reg.update_state(&record, state))
            .await
    }
}
