use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::plan::OrchestrationPlan;
use crate::types::PedimentoKey;

use super::executor::{StepExecutor, StepResult};

// ---------------------------------------------------------------------------
// RunSummary
// ---------------------------------------------------------------------------

/// Result of one orchestration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    #[serde(flatten)]
    pub key: PedimentoKey,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub attempted: Vec<StepResult>,
    pub succeeded_count: u32,
    pub failed_count: u32,
}

impl RunSummary {
    fn start(key: PedimentoKey) -> Self {
        Self {
            key,
            started_at: Utc::now(),
            finished_at: None,
            attempted: Vec::new(),
            succeeded_count: 0,
            failed_count: 0,
        }
    }

    fn record(&mut self, result: StepResult) {
        if result.is_success() {
            self.succeeded_count += 1;
        } else {
            self.failed_count += 1;
        }
        self.attempted.push(result);
    }

    fn finish(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed_count == 0
    }
}

// ---------------------------------------------------------------------------
// RunSink
// ---------------------------------------------------------------------------

/// Receives the summary of every finished run. Nobody awaits a run, so the
/// sink is its only result channel.
#[async_trait]
pub trait RunSink: Send + Sync {
    async fn on_complete(&self, summary: &RunSummary);
}

/// Default sink: logs the summary.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl RunSink for LogSink {
    async fn on_complete(&self, summary: &RunSummary) {
        let total = summary.attempted.len();
        if summary.all_succeeded() {
            info!(
                pedimento = %summary.key,
                succeeded = summary.succeeded_count,
                total,
                "automatic services completed"
            );
        } else {
            warn!(
                pedimento = %summary.key,
                succeeded = summary.succeeded_count,
                failed = summary.failed_count,
                total,
                "automatic services completed with errors"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Wait before the first step so the upstream subsystem can finish
    /// creating the dependent records.
    pub settle_delay: Duration,
    /// Wait between consecutive steps, whatever the previous outcome.
    pub inter_step_delay: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(5),
            inter_step_delay: Duration::from_secs(3),
        }
    }
}

/// Drives a plan's applicable steps strictly in order, one at a time.
pub struct Orchestrator {
    executor: StepExecutor,
    timing: Timing,
    sink: Arc<dyn RunSink>,
}

impl Orchestrator {
    pub fn new(executor: StepExecutor, timing: Timing, sink: Arc<dyn RunSink>) -> Self {
        Self {
            executor,
            timing,
            sink,
        }
    }

    /// Execute every applicable step and hand the summary to the sink.
    ///
    /// Step failures, including registry failures, are recorded and never
    /// stop the run.
    pub async fn run(&self, plan: &OrchestrationPlan) -> RunSummary {
        let key = &plan.key;
        let mut summary = RunSummary::start(key.clone());
        let steps: Vec<_> = plan.applicable_steps().collect();
        info!(pedimento = %key, steps = ?steps, "starting automatic services");

        tokio::time::sleep(self.timing.settle_delay).await;

        for (i, kind) in steps.iter().copied().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.timing.inter_step_delay).await;
            }
            info!(pedimento = %key, %kind, "processing step");
            let result = self.executor.execute(kind, key).await;
            summary.record(result);
        }

        let summary = summary.finish();
        self.sink.on_complete(&summary).await;
        summary
    }

    /// Launch the run as a detached background task.
    ///
    /// The handle may be dropped; the run continues regardless.
    pub fn spawn(self: Arc<Self>, plan: OrchestrationPlan) -> JoinHandle<RunSummary> {
        tokio::spawn(async move { self.run(&plan).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::orchestrator::executor::tests::{BrokenRegistry, FinishRefused, ScriptedInvoker};
    use crate::orchestrator::executor::{Discovery, DownstreamInvoker, StepOutcome};
    use crate::plan::CompletionMetadata;
    use crate::registry::{MemoryRegistry, ServiceRegistry};
    use crate::retry::RetryPolicy;
    use crate::types::{ServiceKind, ServiceRecord, ServiceState};
    use std::sync::Mutex;
    use tokio::time::Instant;

    fn key() -> PedimentoKey {
        PedimentoKey::new("org-1", "ped-1")
    }

    fn plan(items: i64, remesas: bool) -> OrchestrationPlan {
        OrchestrationPlan::derive(&CompletionMetadata::new(key(), items, remesas))
    }

    async fn seed(registry: &MemoryRegistry, kinds: &[ServiceKind]) {
        for &kind in kinds {
            registry.create(&key(), kind).await.unwrap();
        }
    }

    #[derive(Default)]
    struct CapturingSink {
        seen: Mutex<Vec<RunSummary>>,
    }

    #[async_trait]
    impl RunSink for CapturingSink {
        async fn on_complete(&self, summary: &RunSummary) {
            self.seen.lock().unwrap().push(summary.clone());
        }
    }

    /// Invoker wrapper that records the registry state of every step kind at
    /// the moment each invocation starts.
    struct OrderProbe {
        registry: Arc<MemoryRegistry>,
        inner: ScriptedInvoker,
        observed: Mutex<Vec<(ServiceKind, Vec<(ServiceKind, ServiceState)>)>>,
    }

    #[async_trait]
    impl DownstreamInvoker for OrderProbe {
        async fn invoke(
            &self,
            kind: ServiceKind,
            key: &PedimentoKey,
        ) -> std::result::Result<(), crate::error::DownstreamError> {
            let snapshot = self
                .registry
                .list()
                .await
                .into_iter()
                .map(|r| (r.kind, r.state))
                .collect();
            self.observed.lock().unwrap().push((kind, snapshot));
            self.inner.invoke(kind, key).await
        }
    }

    fn orchestrator(
        registry: Arc<dyn ServiceRegistry>,
        invoker: Arc<dyn DownstreamInvoker>,
        sink: Arc<dyn RunSink>,
    ) -> Orchestrator {
        let executor =
            StepExecutor::new(registry, invoker, RetryPolicy::default(), Discovery::default());
        Orchestrator::new(executor, Timing::default(), sink)
    }

    #[tokio::test(start_paused = true)]
    async fn all_steps_succeed_in_plan_order() {
        let registry = Arc::new(MemoryRegistry::new());
        seed(&registry, &[ServiceKind::Partidas, ServiceKind::Remesas, ServiceKind::Acuse]).await;
        let invoker = Arc::new(ScriptedInvoker::default());
        let sink = Arc::new(CapturingSink::default());

        let summary = orchestrator(registry, invoker.clone(), sink.clone())
            .run(&plan(4, true))
            .await;

        assert_eq!(
            invoker.calls(),
            vec![ServiceKind::Partidas, ServiceKind::Remesas, ServiceKind::Acuse]
        );
        assert_eq!(summary.succeeded_count, 3);
        assert_eq!(summary.failed_count, 0);
        assert!(summary.finished_at.is_some());
        assert_eq!(sink.seen.lock().unwrap().as_slice(), &[summary]);
    }

    #[tokio::test(start_paused = true)]
    async fn settle_and_inter_step_delays_are_applied() {
        let registry = Arc::new(MemoryRegistry::new());
        seed(&registry, &[ServiceKind::Partidas, ServiceKind::Acuse]).await;
        let invoker = Arc::new(ScriptedInvoker::default());

        let started = Instant::now();
        orchestrator(registry, invoker, Arc::new(LogSink))
            .run(&plan(1, false))
            .await;

        // 5s settle + one 3s gap between the two steps.
        assert_eq!(started.elapsed(), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn later_steps_start_only_after_previous_outcome_is_recorded() {
        let registry = Arc::new(MemoryRegistry::new());
        seed(&registry, &[ServiceKind::Partidas, ServiceKind::Remesas, ServiceKind::Acuse]).await;
        let probe = Arc::new(OrderProbe {
            registry: registry.clone(),
            inner: ScriptedInvoker::default()
                .failing(ServiceKind::Partidas, &[false, false, false]),
            observed: Mutex::new(Vec::new()),
        });

        orchestrator(registry, probe.clone(), Arc::new(LogSink))
            .run(&plan(2, true))
            .await;

        let observed = probe.observed.lock().unwrap().clone();
        let state_of = |snapshot: &[(ServiceKind, ServiceState)], kind| {
            snapshot.iter().find(|(k, _)| *k == kind).map(|(_, s)| *s)
        };
        for (kind, snapshot) in &observed {
            match kind {
                ServiceKind::Remesas => assert_eq!(
                    state_of(snapshot.as_slice(), ServiceKind::Partidas),
                    Some(ServiceState::Error)
                ),
                ServiceKind::Acuse => assert_eq!(
                    state_of(snapshot.as_slice(), ServiceKind::Remesas),
                    Some(ServiceState::Finished)
                ),
                _ => {}
            }
        }
        assert!(observed.iter().any(|(k, _)| *k == ServiceKind::Acuse));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_step_does_not_stop_the_run() {
        let registry = Arc::new(MemoryRegistry::new());
        seed(&registry, &[ServiceKind::Partidas, ServiceKind::Remesas, ServiceKind::Acuse]).await;
        let invoker = Arc::new(
            ScriptedInvoker::default().failing(ServiceKind::Partidas, &[false, false, false]),
        );

        let summary = orchestrator(registry, invoker.clone(), Arc::new(LogSink))
            .run(&plan(10, true))
            .await;

        assert_eq!(summary.failed_count, 1);
        assert_eq!(summary.succeeded_count, 2);
        assert_eq!(summary.attempted[0].kind, ServiceKind::Partidas);
        assert_eq!(summary.attempted[0].outcome, StepOutcome::Failure);
        assert_eq!(summary.attempted[0].attempts, 3);
        assert_eq!(
            invoker.calls(),
            vec![
                ServiceKind::Partidas,
                ServiceKind::Partidas,
                ServiceKind::Partidas,
                ServiceKind::Remesas,
                ServiceKind::Acuse,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn missing_partidas_record_still_runs_acuse() {
        let registry = Arc::new(MemoryRegistry::new());
        seed(&registry, &[ServiceKind::Acuse]).await;
        let invoker = Arc::new(ScriptedInvoker::default());

        let summary = orchestrator(registry, invoker.clone(), Arc::new(LogSink))
            .run(&plan(5, false))
            .await;

        assert_eq!(summary.attempted.len(), 2);
        assert_eq!(summary.succeeded_count, 1);
        assert_eq!(summary.failed_count, 1);
        let partidas = &summary.attempted[0];
        assert_eq!(partidas.kind, ServiceKind::Partidas);
        assert_eq!(partidas.attempts, 0);
        assert!(partidas.reason.as_deref().unwrap().contains("not found"));
        assert_eq!(invoker.calls(), vec![ServiceKind::Acuse]);
    }

    #[tokio::test(start_paused = true)]
    async fn inapplicable_steps_are_skipped_entirely() {
        let registry = Arc::new(MemoryRegistry::new());
        seed(&registry, &[ServiceKind::Partidas, ServiceKind::Remesas, ServiceKind::Acuse]).await;
        let invoker = Arc::new(ScriptedInvoker::default());

        let summary = orchestrator(registry.clone(), invoker.clone(), Arc::new(LogSink))
            .run(&plan(0, false))
            .await;

        assert_eq!(summary.attempted.len(), 1);
        assert_eq!(invoker.calls(), vec![ServiceKind::Acuse]);
        let partidas: Option<ServiceRecord> =
            registry.find(&key(), ServiceKind::Partidas).await.unwrap();
        assert_eq!(partidas.unwrap().state, ServiceState::Created);
    }

    #[tokio::test(start_paused = true)]
    async fn registry_failure_is_isolated_to_its_step() {
        let inner = MemoryRegistry::new();
        seed(&inner, &[ServiceKind::Partidas, ServiceKind::Acuse]).await;
        let registry = Arc::new(BrokenRegistry { inner });
        let invoker = Arc::new(ScriptedInvoker::default());

        let summary = orchestrator(registry, invoker, Arc::new(LogSink))
            .run(&plan(1, false))
            .await;

        assert_eq!(summary.attempted.len(), 2);
        assert_eq!(summary.failed_count, 2);
        assert!(summary.attempted[0]
            .reason
            .as_deref()
            .unwrap()
            .starts_with("registry error"));
    }

    #[tokio::test(start_paused = true)]
    async fn summary_counts_invocations_made_before_registry_failure() {
        let inner = MemoryRegistry::new();
        seed(&inner, &[ServiceKind::Remesas, ServiceKind::Acuse]).await;
        let registry = Arc::new(FinishRefused { inner });
        let invoker = Arc::new(
            ScriptedInvoker::default().failing(ServiceKind::Remesas, &[false, false, true]),
        );

        let summary = orchestrator(registry, invoker.clone(), Arc::new(LogSink))
            .run(&plan(0, true))
            .await;

        let remesas = &summary.attempted[0];
        assert_eq!(remesas.kind, ServiceKind::Remesas);
        assert_eq!(remesas.outcome, StepOutcome::Failure);
        assert_eq!(remesas.attempts, 3);
        assert!(remesas.service_id.is_some());
        assert_eq!(summary.attempted[1].attempts, 1);
        assert_eq!(invoker.calls().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_run_completes_in_background() -> Result<()> {
        let registry = Arc::new(MemoryRegistry::new());
        seed(&registry, &[ServiceKind::Acuse]).await;
        let sink = Arc::new(CapturingSink::default());
        let orch = Arc::new(orchestrator(
            registry.clone(),
            Arc::new(ScriptedInvoker::default()),
            sink.clone(),
        ));

        let handle = orch.spawn(plan(0, false));
        let summary = handle.await.expect("run task panicked");

        assert_eq!(summary.succeeded_count, 1);
        assert_eq!(sink.seen.lock().unwrap().len(), 1);
        let acuse = registry.find(&key(), ServiceKind::Acuse).await?;
        assert_eq!(acuse.map(|r| r.state), Some(ServiceState::Finished));
        Ok(())
    }
}
