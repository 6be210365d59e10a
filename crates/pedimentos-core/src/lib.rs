pub mod completion;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod plan;
pub mod registry;
pub mod retry;
pub mod status;
pub mod types;

pub use completion::{CompletionProcessor, PrimaryRequest};
pub use config::Config;
pub use error::{DownstreamError, PedimentoError, Result};
pub use plan::{CompletionMetadata, OrchestrationPlan};
pub use registry::{LocalRegistry, MemoryRegistry, ServiceRegistry};
pub use retry::RetryPolicy;
pub use status::{StatusAggregator, StatusReport};
pub use types::{PedimentoKey, ServiceKind, ServiceRecord, ServiceState};
