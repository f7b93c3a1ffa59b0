//! # Orchestrator
//!
//! The run orchestration engine for the analysis-pipeline gateway: turns a
//! `(project, worker-key, user-input)` request into a tracked, resumable run.
//!
//! ## Design principles
//!
//! - **One producer per run**: the Worker Executor is the sole writer into a
//!   run's event channel, so consumer order equals production order.
//! - **Narrow locks**: registries (interactions, UI nodes, projects) are mutated
//!   under short-held locks; user callbacks and channel sends never happen while
//!   a lock is held.
//! - **Distinct error kinds over strings**: every component has its own
//!   `thiserror` enum; [`OrchestratorError`] wraps them at the crate boundary.
//!
//! ## Main modules
//!
//! - [`scheduler`]: [`scheduler::ChunkScheduler`] — capacity-bounded DAG chunk packing.
//! - [`interaction`]: [`interaction::InteractionManager`] — pending human-input tracking.
//! - [`broker`]: [`broker::EventBroker`] — per-run buffered event channel.
//! - [`ui_node`]: [`ui_node::UiNodeStore`] — latest UI node snapshot per run.
//! - [`run_context`]: [`run_context::RunContextBuilder`] — per-project execution environment.
//! - [`executor`]: [`executor::WorkerExecutor`] — drives one worker end-to-end.
//! - [`chat`]: [`chat::ChatEventMapper`] — projects run events into chat events.
//! - [`trace`]: [`trace::TraceLogger`] — append-only per-run JSONL diagnostics.
//! - [`delta`]: [`delta::diff`]/[`delta::apply`] — JSON field-path deltas.

pub mod broker;
pub mod chat;
pub mod delta;
pub mod error;
pub mod executor;
pub mod interaction;
pub mod run;
pub mod run_context;
pub mod scheduler;
pub mod trace;
pub mod ui_node;

pub use broker::{EventBroker, EventReceiver};
pub use chat::ChatEventMapper;
pub use delta::{apply, diff, Delta};
pub use error::OrchestratorError;
pub use executor::WorkerExecutor;
pub use interaction::{InteractionError, InteractionManager};
pub use run::{Run, RunId, RunState, WorkerOutput};
pub use run_context::{RunContext, RunContextBuilder};
pub use scheduler::{ChunkScheduler, DagNode, NodeId, SchedulerError};
pub use trace::TraceLogger;
pub use ui_node::UiNodeStore;

#[cfg(test)]
mod test_logging {
    use ctor::ctor;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::Layer;

    #[ctor]
    fn init() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_filter(filter),
            )
            .try_init();
    }
}
