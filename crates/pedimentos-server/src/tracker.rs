//! In-process bookkeeping of orchestration runs.
//!
//! At most one run is active per pedimento. A second completion event for a
//! pedimento whose run is still active is not launched. Finished runs are
//! kept in a bounded history so their plans keep narrowing status reports.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use pedimentos_core::orchestrator::{Orchestrator, RunSummary};
use pedimentos_core::{OrchestrationPlan, PedimentoKey};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::{AbortHandle, JoinError};
use tracing::{error, info, warn};

const HISTORY_LIMIT: usize = 50;

struct ActiveRun {
    id: String,
    started_at: DateTime<Utc>,
    plan: OrchestrationPlan,
    abort: AbortHandle,
}

#[derive(Debug, Clone, Serialize)]
pub struct FinishedRun {
    pub id: String,
    pub plan: OrchestrationPlan,
    pub summary: RunSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActiveRunView {
    pub id: String,
    pub pedimento_id: String,
    pub organizacion: String,
    pub started_at: DateTime<Utc>,
    pub plan: OrchestrationPlan,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunsOverview {
    pub active: Vec<ActiveRunView>,
    pub recent: Vec<FinishedRun>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Launch {
    Scheduled { run_id: String },
    AlreadyRunning { run_id: String },
}

#[derive(Default)]
struct Inner {
    active: HashMap<PedimentoKey, ActiveRun>,
    history: VecDeque<FinishedRun>,
}

#[derive(Clone, Default)]
pub struct RunTracker {
    inner: Arc<Mutex<Inner>>,
}

impl RunTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `plan` in the background unless a run for the same pedimento is
    /// still active.
    pub async fn launch(&self, orchestrator: Arc<Orchestrator>, plan: OrchestrationPlan) -> Launch {
        let key = plan.key.clone();

        // Check and insert under one lock window; the spawned task cannot
        // reach `finish` before the entry exists.
        let mut inner = self.inner.lock().await;
        if let Some(active) = inner.active.get(&key) {
            warn!(pedimento = %key, run_id = %active.id, "automatic services already running");
            return Launch::AlreadyRunning {
                run_id: active.id.clone(),
            };
        }

        let run_id = uuid::Uuid::new_v4().to_string();
        let task_plan = plan.clone();
        let handle = tokio::spawn(async move { orchestrator.run(&task_plan).await });
        let abort = handle.abort_handle();

        // Supervise the run so its slot is released even if it panics.
        let tracker = self.clone();
        let task_plan = plan.clone();
        let task_id = run_id.clone();
        tokio::spawn(async move {
            match handle.await {
                Ok(summary) => tracker.finish(task_id, task_plan, summary).await,
                Err(e) => tracker.release(&task_id, &task_plan.key, &e).await,
            }
        });

        info!(pedimento = %key, run_id = %run_id, "automatic services scheduled");
        inner.active.insert(
            key,
            ActiveRun {
                id: run_id.clone(),
                started_at: Utc::now(),
                plan,
                abort,
            },
        );
        Launch::Scheduled { run_id }
    }

    async fn finish(&self, id: String, plan: OrchestrationPlan, summary: RunSummary) {
        let mut inner = self.inner.lock().await;
        if inner.active.get(&plan.key).is_some_and(|a| a.id == id) {
            inner.active.remove(&plan.key);
        }
        inner.history.push_front(FinishedRun { id, plan, summary });
        inner.history.truncate(HISTORY_LIMIT);
    }

    /// Drop the active entry of a run that ended without a summary.
    async fn release(&self, id: &str, key: &PedimentoKey, cause: &JoinError) {
        let mut inner = self.inner.lock().await;
        if inner.active.get(key).is_some_and(|a| a.id == id) {
            inner.active.remove(key);
        }
        if cause.is_panic() {
            error!(pedimento = %key, run_id = %id, "automatic services run panicked");
        }
    }

    /// Plan of the active run for `key`, or of its most recent finished run.
    pub async fn plan_for(&self, key: &PedimentoKey) -> Option<OrchestrationPlan> {
        let inner = self.inner.lock().await;
        if let Some(active) = inner.active.get(key) {
            return Some(active.plan.clone());
        }
        inner
            .history
            .iter()
            .find(|run| &run.plan.key == key)
            .map(|run| run.plan.clone())
    }

    pub async fn overview(&self) -> RunsOverview {
        let inner = self.inner.lock().await;
        let mut active: Vec<ActiveRunView> = inner
            .active
            .values()
            .map(|run| ActiveRunView {
                id: run.id.clone(),
                pedimento_id: run.plan.key.pedimento_id.clone(),
                organizacion: run.plan.key.organization_id.clone(),
                started_at: run.started_at,
                plan: run.plan.clone(),
            })
            .collect();
        active.sort_by_key(|run| run.started_at);
        RunsOverview {
            active,
            recent: inner.history.iter().cloned().collect(),
        }
    }

    /// Abort every active run. Used on shutdown; records already marked
    /// `EN_PROCESO` stay that way until the next startup recovery.
    pub async fn abort_all(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let count = inner.active.len();
        for (key, run) in inner.active.drain() {
            warn!(pedimento = %key, run_id = %run.id, "aborting automatic services");
            run.abort.abort();
        }
        count
    }
}
