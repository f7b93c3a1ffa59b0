//! Core run types: identity, lifecycle state, and the worker's step output.
//!
//! `WorkerOutput` is the "variant return from workers" design generalized
//! into a tagged union: the Worker Executor dispatches on
//! [`WorkerOutput::needs_more_input`] rather than on type introspection of a
//! worker-specific runtime state.

use serde_json::Value;

pub type RunId = String;
pub type ProjectId = String;

/// `Allocated → Running → (Waiting ⇄ Running)* → Terminal(Complete|Error|Canceled)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Allocated,
    Running,
    Waiting,
    Complete,
    Error,
    Canceled,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Complete | RunState::Error | RunState::Canceled)
    }
}

/// One tracked run.
#[derive(Debug, Clone)]
pub struct Run {
    pub run_id: RunId,
    pub project_id: ProjectId,
    pub worker_key: String,
    pub state: RunState,
}

impl Run {
    pub fn new(run_id: RunId, project_id: ProjectId, worker_key: String) -> Self {
        Self {
            run_id,
            project_id,
            worker_key,
            state: RunState::Allocated,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Builds a run id in `<worker>-<nanos>` format.
pub fn new_run_id(worker_key: &str) -> RunId {
    format!("{worker_key}-{}", now_nanos())
}

fn now_nanos() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}

/// One step of a worker's execution: either it's done (possibly with a final
/// client view) or it needs more input before it can continue.
#[derive(Debug, Clone)]
pub enum WorkerOutput {
    /// The worker has produced a result and will not be called again.
    Done { client_view: Option<Value> },
    /// The worker yielded a "need more input" sentinel; `prompt` is shown to
    /// the user and the next call's input is the human's answer.
    NeedMoreInput {
        prompt: String,
        client_view: Option<Value>,
    },
    /// The worker emitted (or removed) a UI node mid-step, without yet being
    /// done or needing input. The executor upserts/clears the UI Node Store
    /// and continues driving the same worker invocation.
    NodeUpdate { node: Option<Value> },
    /// A plain progress/log line emitted mid-step. `state` carries the
    /// worker's own opaque runtime state forward to its next `step` call
    /// (the executor does not interpret it); `None` leaves the previously
    /// carried state unchanged.
    Progress {
        message: Option<String>,
        progress_percent: Option<u8>,
        state: Option<Value>,
    },
}

impl WorkerOutput {
    pub fn needs_more_input(&self) -> bool {
        matches!(self, WorkerOutput::NeedMoreInput { .. })
    }

    pub fn is_done(&self) -> bool {
        matches!(self, WorkerOutput::Done { .. })
    }
}
