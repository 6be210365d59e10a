//! Post-completion orchestration engine.
//!
//! Provides `StepExecutor` (one dependent service, with discovery and
//! retries) and `Orchestrator` (the whole plan, sequentially, in a detached
//! task). Neither holds durable state; the registry is the record of truth.

pub mod executor;
pub mod run;

pub use executor::{Discovery, DownstreamInvoker, StepExecutor, StepOutcome, StepResult};
pub use run::{LogSink, Orchestrator, RunSink, RunSummary, Timing};
