//! Execution of a single dependent-service step.
//!
//! A step first locates its service record (the upstream subsystem creates
//! it asynchronously, so the executor polls), then drives the record through
//! `InProgress → Finished | Error` while invoking the dependent service with
//! bounded retries. Every transition is written to the registry before the
//! executor moves on.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{DownstreamError, Result};
use crate::retry::RetryPolicy;
use crate::registry::ServiceRegistry;
use crate::types::{PedimentoKey, ServiceKind, ServiceRecord, ServiceState};

/// Invokes the dependent service that computes a step's result.
#[async_trait]
pub trait DownstreamInvoker: Send + Sync {
    async fn invoke(&self, kind: ServiceKind, key: &PedimentoKey)
        -> std::result::Result<(), DownstreamError>;
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// How long and how often to poll for a step's service record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Discovery {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for Discovery {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            interval: Duration::from_secs(1),
        }
    }
}

// ---------------------------------------------------------------------------
// StepResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepOutcome {
    Success,
    Failure,
}

/// Outcome of one step, as recorded in the run summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub kind: ServiceKind,
    pub outcome: StepOutcome,
    /// Number of downstream invocations made.
    pub attempts: u32,
    #[serde(rename = "duration_ms", with = "duration_ms")]
    pub duration: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl StepResult {
    pub fn is_success(&self) -> bool {
        self.outcome == StepOutcome::Success
    }

    fn success(kind: ServiceKind, attempts: u32, started: Instant, record: &ServiceRecord) -> Self {
        Self {
            kind,
            outcome: StepOutcome::Success,
            attempts,
            duration: started.elapsed(),
            service_id: Some(record.id.clone()),
            reason: None,
        }
    }

    fn failure(
        kind: ServiceKind,
        attempts: u32,
        started: Instant,
        service_id: Option<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            outcome: StepOutcome::Failure,
            attempts,
            duration: started.elapsed(),
            service_id,
            reason: Some(reason.into()),
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

// ---------------------------------------------------------------------------
// StepExecutor
// ---------------------------------------------------------------------------

/// What a step has done so far, kept for the failure report when the
/// registry gives out midway.
#[derive(Debug, Default)]
struct Progress {
    attempts: u32,
    service_id: Option<String>,
}

pub struct StepExecutor {
    registry: Arc<dyn ServiceRegistry>,
    invoker: Arc<dyn DownstreamInvoker>,
    policy: RetryPolicy,
    discovery: Discovery,
}

impl StepExecutor {
    pub fn new(
        registry: Arc<dyn ServiceRegistry>,
        invoker: Arc<dyn DownstreamInvoker>,
        policy: RetryPolicy,
        discovery: Discovery,
    ) -> Self {
        Self {
            registry,
            invoker,
            policy,
            discovery,
        }
    }

    /// Run one step to its final outcome.
    ///
    /// Downstream failures are retried per the policy and reported as a
    /// `Failure` outcome once exhausted. A registry failure ends the step
    /// immediately, is never retried, and is reported as a `Failure` that
    /// still counts the downstream invocations already made.
    pub async fn execute(&self, kind: ServiceKind, key: &PedimentoKey) -> StepResult {
        let started = Instant::now();
        let mut progress = Progress::default();
        match self.drive(kind, key, started, &mut progress).await {
            Ok(result) => result,
            Err(e) => {
                error!(
                    pedimento = %key,
                    %kind,
                    attempts = progress.attempts,
                    error = %e,
                    "registry failure during step"
                );
                StepResult::failure(
                    kind,
                    progress.attempts,
                    started,
                    progress.service_id,
                    format!("registry error: {e}"),
                )
            }
        }
    }

    async fn drive(
        &self,
        kind: ServiceKind,
        key: &PedimentoKey,
        started: Instant,
        progress: &mut Progress,
    ) -> Result<StepResult> {
        let Some(mut record) = self.locate(kind, key).await? else {
            warn!(pedimento = %key, %kind, "service not found after discovery timeout");
            return Ok(StepResult::failure(
                kind,
                0,
                started,
                None,
                "service not found",
            ));
        };
        progress.service_id = Some(record.id.clone());

        match record.state {
            ServiceState::Finished => {
                info!(pedimento = %key, %kind, service = %record.id, "service already finished");
                return Ok(StepResult::success(kind, 0, started, &record));
            }
            ServiceState::Error => {
                warn!(pedimento = %key, %kind, service = %record.id, "service already in ERROR");
                return Ok(StepResult::failure(
                    kind,
                    0,
                    started,
                    Some(record.id),
                    "service already in error state",
                ));
            }
            ServiceState::Created | ServiceState::InProgress => {}
        }

        let mut attempt = 0u32;
        loop {
            record = self.registry.set_state(&record, ServiceState::InProgress).await?;
            debug!(pedimento = %key, %kind, attempt, "invoking dependent service");

            progress.attempts = attempt + 1;
            let error = match self.invoker.invoke(kind, key).await {
                Ok(()) => {
                    let record = self.registry.set_state(&record, ServiceState::Finished).await?;
                    info!(pedimento = %key, %kind, attempts = attempt + 1, "step finished");
                    return Ok(StepResult::success(kind, attempt + 1, started, &record));
                }
                Err(e) => e,
            };

            if !self.policy.allows_retry(attempt) {
                self.registry.set_state(&record, ServiceState::Error).await?;
                warn!(
                    pedimento = %key,
                    %kind,
                    attempts = attempt + 1,
                    error = %error,
                    "step failed after exhausting retries"
                );
                return Ok(StepResult::failure(
                    kind,
                    attempt + 1,
                    started,
                    Some(record.id),
                    format!("failed after {} attempts: {error}", attempt + 1),
                ));
            }

            let delay = self.policy.next_delay(attempt);
            warn!(
                pedimento = %key,
                %kind,
                attempt = attempt + 1,
                retry_in_secs = delay.as_secs(),
                error = %error,
                "dependent service failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;

            // Re-read after the wait; another actor may have moved the record.
            match self.registry.find(key, kind).await? {
                None => {
                    return Ok(StepResult::failure(
                        kind,
                        attempt,
                        started,
                        Some(record.id),
                        "service record disappeared during retry",
                    ));
                }
                Some(fresh) if fresh.state == ServiceState::Finished => {
                    info!(pedimento = %key, %kind, "service finished externally during backoff");
                    return Ok(StepResult::success(kind, attempt, started, &fresh));
                }
                Some(fresh) if fresh.state == ServiceState::Error => {
                    return Ok(StepResult::failure(
                        kind,
                        attempt,
                        started,
                        Some(fresh.id),
                        "service moved to error state during retry",
                    ));
                }
                Some(fresh) => record = fresh,
            }
        }
    }

    /// Poll the registry until the record exists or discovery times out.
    async fn locate(&self, kind: ServiceKind, key: &PedimentoKey) -> Result<Option<ServiceRecord>> {
        let deadline = Instant::now() + self.discovery.timeout;
        let mut polls = 0u32;
        loop {
            polls += 1;
            if let Some(record) = self.registry.find(key, kind).await? {
                debug!(pedimento = %key, %kind, polls, "service record located");
                return Ok(Some(record));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            if polls % 10 == 0 {
                info!(pedimento = %key, %kind, polls, "still waiting for service record");
            }
            tokio::time::sleep(self.discovery.interval).await;
        }
    }
}
