//! Worker Executor: drives one worker end-to-end through the
//! Allocated → Running → (Waiting ⇄ Running)* → Terminal state machine.
//!
//! Generalizes `serve/src/run/stream.rs`'s `run_agent_task` (single
//! append/event channel bridge, "never propagate panics out of the task")
//! from a fixed ReAct loop into a dispatch over [`crate::run::WorkerOutput`]'s
//! tag, registering/waiting on the Interaction Manager whenever a worker
//! needs more input.

use std::sync::Arc;
use std::time::Duration;

use orchestrator_protocol::RunEvent;

use crate::broker::{EventBroker, EventReceiver, DEFAULT_RETENTION};
use crate::interaction::InteractionManager;
use crate::run::{new_run_id, ProjectId, RunId, WorkerOutput};
use crate::run_context::{Worker, WorkerInput};
use crate::trace::TraceLogger;
use crate::ui_node::UiNodeStore;

/// Default timeout for a single `WaitUserInput`.
pub const INPUT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Shared component handles the executor drives a run through. Cloned
/// cheaply (every field is an `Arc`) and typically held once per `App`.
#[derive(Clone)]
pub struct WorkerExecutor {
    pub interactions: Arc<InteractionManager>,
    pub broker: Arc<EventBroker>,
    pub ui_nodes: Arc<UiNodeStore>,
    pub trace: Arc<TraceLogger>,
}

impl WorkerExecutor {
    pub fn new(
        interactions: Arc<InteractionManager>,
        broker: Arc<EventBroker>,
        ui_nodes: Arc<UiNodeStore>,
        trace: Arc<TraceLogger>,
    ) -> Self {
        Self {
            interactions,
            broker,
            ui_nodes,
            trace,
        }
    }

    /// Allocates a run id and event channel and spawns the driving task.
    /// Returns the run id and a receiver subscribed before the task starts,
    /// so a caller that needs every event from the first (e.g. the Chat
    /// Event Mapper bridge) doesn't race the spawned task for the channel's
    /// first sends. All subsequent progress is reported through the broker
    /// channel and the trace log, never back to this caller.
    pub fn launch(
        &self,
        project_id: ProjectId,
        worker_key: String,
        worker: Arc<dyn Worker>,
        user_input: String,
        buffer: usize,
    ) -> (RunId, EventReceiver) {
        let run_id = new_run_id(&worker_key);
        let rx = self.broker.allocate(&run_id, buffer.max(1));
        self.interactions.mark_run_started(&project_id, &run_id);

        let exec = self.clone();
        let run_id_task = run_id.clone();
        tokio::spawn(async move {
            exec.drive(project_id, run_id_task, worker_key, worker, user_input)
                .await;
        });

        (run_id, rx)
    }

    /// Delivers `event` to every current subscriber of `run_id`, awaiting
    /// room in each subscriber's bounded buffer rather than dropping — per
    /// spec, dropped events are not permitted, so a full buffer backpressures
    /// the executor instead.
    async fn emit(&self, run_id: &str, event: RunEvent) {
        if let Some(tx) = self.broker.sender(run_id) {
            tx.send(event).await;
        }
    }

    async fn drive(
        &self,
        project_id: ProjectId,
        run_id: RunId,
        worker_key: String,
        worker: Arc<dyn Worker>,
        first_input: String,
    ) {
        self.trace.append(&run_id, "executor", "started", None).ok();

        let mut next_input = WorkerInput {
            user_input: first_input,
            state: None,
        };

        let terminal = loop {
            let step = worker.step(next_input.clone()).await;
            match step {
                Err(e) => {
                    self.trace
                        .append(
                            &run_id,
                            "executor",
                            "worker_error",
                            Some(serde_json::json!({"error": e.to_string()})),
                        )
                        .ok();
                    break RunEvent::Error {
                        message: e.to_string(),
                    };
                }
                Ok(WorkerOutput::Progress {
                    message,
                    progress_percent,
                    state,
                }) => {
                    self.emit(
                        &run_id,
                        RunEvent::Progress {
                            message,
                            progress_percent,
                        },
                    )
                    .await;
                    // Progress does not end the step; a real worker would
                    // keep looping internally. For this engine's step model,
                    // the worker's next call carries no new input, but may
                    // carry forward updated runtime state.
                    next_input = WorkerInput {
                        user_input: String::new(),
                        state: state.or(next_input.state),
                    };
                    continue;
                }
                Ok(WorkerOutput::NodeUpdate { node }) => {
                    match node {
                        Some(n) => {
                            self.ui_nodes.set(&run_id, n.clone());
                            self.emit(&run_id, RunEvent::NodeReady { node: n }).await;
                        }
                        None => self.ui_nodes.clear(&run_id),
                    }
                    next_input = WorkerInput {
                        user_input: String::new(),
                        state: next_input.state,
                    };
                    continue;
                }
                Ok(WorkerOutput::Done { client_view }) => {
                    break RunEvent::Complete { client_view };
                }
                Ok(WorkerOutput::NeedMoreInput { prompt, client_view }) => {
                    let interaction_id = match self.interactions.register_need_input(
                        &project_id,
                        &run_id,
                        &worker_key,
                        &prompt,
                    ) {
                        Ok(id) => id,
                        Err(e) => {
                            break RunEvent::Error {
                                message: e.to_string(),
                            };
                        }
                    };

                    self.emit(
                        &run_id,
                        RunEvent::InputRequired {
                            input_request_id: interaction_id.clone(),
                            client_view,
                            node: self.ui_nodes.get(&run_id),
                        },
                    )
                    .await;

                    match self.interactions.wait_user_input(&run_id, INPUT_TIMEOUT).await {
                        Ok(input) => {
                            next_input = WorkerInput {
                                user_input: input,
                                state: Some(serde_json::json!({"resumed": true})),
                            };
                            continue;
                        }
                        Err(e) => {
                            break RunEvent::Error {
                                message: e.to_string(),
                            };
                        }
                    }
                }
            }
        };

        self.trace
            .append(
                &run_id,
                "executor",
                "terminal",
                Some(serde_json::json!({"terminal": format!("{:?}", terminal)})),
            )
            .ok();
        self.emit(&run_id, terminal).await;

        self.interactions.clear(&run_id);
        self.ui_nodes.clear(&run_id);
        self.interactions.mark_run_finished(&project_id, &run_id);
        self.broker.schedule_cleanup(run_id, DEFAULT_RETENTION);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_context::EchoWorker;
    use tokio::time::Duration as TokioDuration;

    fn new_executor() -> WorkerExecutor {
        let dir = tempfile::tempdir().unwrap();
        WorkerExecutor::new(
            Arc::new(InteractionManager::new()),
            Arc::new(EventBroker::new()),
            Arc::new(UiNodeStore::new()),
            Arc::new(TraceLogger::new(dir.path())),
        )
    }

    #[tokio::test]
    async fn s1_happy_path_input_required_then_complete() {
        let exec = new_executor();
        let worker = Arc::new(EchoWorker {
            prompt: "say hi".to_string(),
        });
        let (run_id, mut rx) = exec.launch(
            "proj-1".to_string(),
            "bootstrap".to_string(),
            worker,
            String::new(),
            8,
        );

        let first = rx.recv().await.unwrap();
        let (interaction_id, prompt) = match first {
            RunEvent::InputRequired {
                input_request_id, ..
            } => {
                let pending = exec.interactions.get_pending(&run_id).unwrap();
                (input_request_id, pending.prompt)
            }
            other => panic!("expected INPUT_REQUIRED first, got {other:?}"),
        };
        assert_eq!(prompt, "say hi");

        exec.interactions
            .submit_user_input("proj-1", &run_id, Some(&interaction_id), "hello".to_string())
            .unwrap();

        let second = rx.recv().await.unwrap();
        assert!(matches!(second, RunEvent::Complete { .. }));
        assert!(exec.interactions.active_run_id("proj-1").is_none());
    }

    #[tokio::test]
    async fn worker_error_emits_terminal_error_event() {
        struct FailingWorker;
        #[async_trait::async_trait]
        impl Worker for FailingWorker {
            async fn step(
                &self,
                _input: WorkerInput,
            ) -> Result<WorkerOutput, crate::run_context::WorkerError> {
                Err(crate::run_context::WorkerError::Failed("boom".to_string()))
            }
        }

        let exec = new_executor();
        let (_run_id, mut rx) = exec.launch(
            "proj-1".to_string(),
            "w".to_string(),
            Arc::new(FailingWorker),
            String::new(),
            4,
        );
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, RunEvent::Error { message } if message.contains("boom")));
    }
}
