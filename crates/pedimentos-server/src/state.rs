use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use customs_api::{CustomsClient, HttpCompletionProcessor, HttpServiceInvoker, RestRegistry};
use pedimentos_core::config::{Config, RegistryBackend};
use pedimentos_core::orchestrator::{DownstreamInvoker, LogSink, Orchestrator, StepExecutor};
use pedimentos_core::{CompletionProcessor, LocalRegistry, ServiceRegistry};
use tracing::info;

use crate::tracker::RunTracker;

/// Shared, cheaply clonable state for every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<dyn ServiceRegistry>,
    pub processor: Arc<dyn CompletionProcessor>,
    pub orchestrator: Arc<Orchestrator>,
    pub tracker: RunTracker,
}

impl AppState {
    pub fn new(
        config: Config,
        registry: Arc<dyn ServiceRegistry>,
        invoker: Arc<dyn DownstreamInvoker>,
        processor: Arc<dyn CompletionProcessor>,
    ) -> Self {
        let executor = StepExecutor::new(
            registry.clone(),
            invoker,
            config.retry_policy(),
            config.discovery(),
        );
        let orchestrator = Orchestrator::new(executor, config.timing(), Arc::new(LogSink));
        Self {
            config: Arc::new(config),
            registry,
            processor,
            orchestrator: Arc::new(orchestrator),
            tracker: RunTracker::new(),
        }
    }

    /// Wire the HTTP collaborators and the configured registry backend.
    ///
    /// With the local backend, records left `EN_PROCESO` by a previous process
    /// are marked `ERROR` first.
    pub fn from_config(root: &Path, config: Config) -> anyhow::Result<Self> {
        if config.registry.backend == RegistryBackend::Local {
            let path = config.registry.resolved_path(root);
            let recovered = LocalRegistry::open(&path)?.startup_recovery(Duration::from_secs(
                config.registry.recovery_max_age_secs,
            ))?;
            info!(path = %path.display(), recovered, "local registry ready");
        }

        let registry = registry_from_config(root, &config)?;
        let invoker = HttpServiceInvoker::new(
            &config.services.base_url,
            Duration::from_secs(config.services.timeout_secs),
        )?;
        let processor = HttpCompletionProcessor::new(
            &config.processor.url,
            Duration::from_secs(config.processor.timeout_secs),
        )?;
        Ok(Self::new(
            config,
            registry,
            Arc::new(invoker),
            Arc::new(processor),
        ))
    }
}

/// Open the registry backend selected by `registry.backend`.
pub fn registry_from_config(
    root: &Path,
    config: &Config,
) -> anyhow::Result<Arc<dyn ServiceRegistry>> {
    match config.registry.backend {
        RegistryBackend::Rest => {
            let client = CustomsClient::new(
                &config.api.base_url,
                &config.api.token,
                Duration::from_secs(config.api.timeout_secs),
            )?;
            Ok(Arc::new(RestRegistry::new(client)))
        }
        RegistryBackend::Local => {
            let registry = LocalRegistry::open(&config.registry.resolved_path(root))?;
            Ok(Arc::new(registry))
        }
    }
}
