//! Service registry seam.
//!
//! The registry is the durable source of truth for service records. The
//! orchestration engine only reads snapshots and writes state transitions
//! through this trait; every call is independently atomic.

pub mod local;
pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{PedimentoKey, ServiceKind, ServiceRecord, ServiceState};

pub use local::LocalRegistry;
pub use memory::MemoryRegistry;

#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Fetch the record of `kind` for a pedimento, in any state.
    async fn find(&self, key: &PedimentoKey, kind: ServiceKind) -> Result<Option<ServiceRecord>>;

    /// Create a `Created` record. Fails if one already exists for the tuple.
    async fn create(&self, key: &PedimentoKey, kind: ServiceKind) -> Result<ServiceRecord>;

    /// Persist a state transition and return the stored record.
    async fn set_state(&self, record: &ServiceRecord, state: ServiceState)
        -> Result<ServiceRecord>;

    /// Create a `Created` record tagged with the caller's processing type.
    /// Backends that do not track processing types create a plain record.
    async fn create_with_processing(
        &self,
        key: &PedimentoKey,
        kind: ServiceKind,
        _processing_type: i64,
    ) -> Result<ServiceRecord> {
        self.create(key, kind).await
    }

    /// Return the existing record for the tuple, creating it with
    /// `processing_type` when absent.
    async fn find_or_create(
        &self,
        key: &PedimentoKey,
        kind: ServiceKind,
        processing_type: i64,
    ) -> Result<ServiceRecord> {
        match self.find(key, kind).await? {
            Some(record) => Ok(record),
            None => {
                self.create_with_processing(key, kind, processing_type)
                    .await
            }
        }
    }
}
