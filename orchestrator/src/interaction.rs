//! Interaction Manager: tracks pending human-input requests per run, pairs
//! `Register → Wait → Submit` with timeout and cancellation, and maps
//! run ↔ conversation.
//!
//! Grounded on `serve/src/run/delivery.rs`'s single-pending-request-per-run
//! bridging pattern, generalized from an inline channel pair into a standalone
//! registry so the Worker Executor and the RPC façade can share it across runs.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InteractionError {
    #[error("a pending interaction already exists for this run")]
    AlreadyPending,

    #[error("no pending interaction for this run")]
    NoPending,

    #[error("timed out waiting for user input")]
    Timeout,

    #[error("wait was canceled")]
    Canceled,

    #[error("project_id does not match the pending interaction's project")]
    Mismatch,

    #[error("input for this interaction was already received")]
    AlreadyReceived,
}

struct Pending {
    interaction_id: String,
    project_id: String,
    worker_key: String,
    prompt: String,
    input_tx: Option<oneshot::Sender<String>>,
    input_rx: Option<oneshot::Receiver<String>>,
    done_tx: Option<oneshot::Sender<()>>,
    done_rx: Option<oneshot::Receiver<()>>,
}

/// Read-only snapshot of a pending interaction, for reconnecting watchers.
#[derive(Debug, Clone)]
pub struct PendingSnapshot {
    pub interaction_id: String,
    pub project_id: String,
    pub worker_key: String,
    pub prompt: String,
}

#[derive(Default)]
struct Inner {
    pending: HashMap<String, Pending>,
    active_run_by_project: HashMap<String, String>,
    project_by_run: HashMap<String, String>,
    conversation_by_run: HashMap<String, String>,
    run_by_conversation: HashMap<String, String>,
}

/// Tracks pending human-input requests, active-run-per-project state, and the
/// run↔conversation mapping. Never holds its lock across an await point: all
/// blocking happens on a pending entry's channels after the lock is released.
pub struct InteractionManager {
    inner: Mutex<Inner>,
}

impl Default for InteractionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractionManager {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn mark_run_started(&self, project_id: &str, run_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .active_run_by_project
            .insert(project_id.to_string(), run_id.to_string());
        inner
            .project_by_run
            .insert(run_id.to_string(), project_id.to_string());
    }

    pub fn mark_run_finished(&self, project_id: &str, run_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        if inner.active_run_by_project.get(project_id).map(String::as_str) == Some(run_id) {
            inner.active_run_by_project.remove(project_id);
        }
        inner.project_by_run.remove(run_id);
    }

    pub fn active_run_id(&self, project_id: &str) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .active_run_by_project
            .get(project_id)
            .cloned()
    }

    /// Registers a need-for-input prompt for `run_id`. Fails with
    /// `AlreadyPending` if one already exists for this run.
    pub fn register_need_input(
        &self,
        project_id: &str,
        run_id: &str,
        worker_key: &str,
        prompt: &str,
    ) -> Result<String, InteractionError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.pending.contains_key(run_id) {
            return Err(InteractionError::AlreadyPending);
        }
        let interaction_id = format!("input-{}", now_nanos());
        let (input_tx, input_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();
        inner.pending.insert(
            run_id.to_string(),
            Pending {
                interaction_id: interaction_id.clone(),
                project_id: project_id.to_string(),
                worker_key: worker_key.to_string(),
                prompt: prompt.to_string(),
                input_tx: Some(input_tx),
                input_rx: Some(input_rx),
                done_tx: Some(done_tx),
                done_rx: Some(done_rx),
            },
        );
        Ok(interaction_id)
    }

    /// Waits for `SubmitUserInput` to resolve the pending entry for `run_id`,
    /// a cancellation via `clear`, or `timeout`, whichever comes first.
    /// On any outcome the pending entry is cleared.
    pub async fn wait_user_input(
        &self,
        run_id: &str,
        timeout: Duration,
    ) -> Result<String, InteractionError> {
        let (input_rx, done_rx) = {
            let mut inner = self.inner.lock().unwrap();
            let pending = inner.pending.get_mut(run_id).ok_or(InteractionError::NoPending)?;
            let input_rx = pending.input_rx.take().ok_or(InteractionError::NoPending)?;
            let done_rx = pending.done_rx.take().ok_or(InteractionError::NoPending)?;
            (input_rx, done_rx)
        };

        let result = tokio::select! {
            v = input_rx => v.map_err(|_| InteractionError::Canceled),
            _ = done_rx => Err(InteractionError::Canceled),
            _ = tokio::time::sleep(timeout) => Err(InteractionError::Timeout),
        };

        self.inner.lock().unwrap().pending.remove(run_id);
        result
    }

    /// Submits input for the pending interaction on `run_id`. If
    /// `interaction_id` is given and mismatches the stored id, the stored id
    /// wins (soft override) and a warning is logged rather than rejecting the
    /// submission.
    pub fn submit_user_input(
        &self,
        project_id: &str,
        run_id: &str,
        interaction_id: Option<&str>,
        input: String,
    ) -> Result<String, InteractionError> {
        let mut inner = self.inner.lock().unwrap();
        let pending = inner.pending.get_mut(run_id).ok_or(InteractionError::NoPending)?;
        if pending.project_id != project_id {
            return Err(InteractionError::Mismatch);
        }
        if let Some(given) = interaction_id {
            if given != pending.interaction_id {
                tracing::warn!(
                    run_id,
                    given,
                    stored = %pending.interaction_id,
                    "submit_user_input: interaction_id mismatch, using stored id"
                );
            }
        }
        let tx = pending.input_tx.take().ok_or(InteractionError::AlreadyReceived)?;
        tx.send(input).map_err(|_| InteractionError::AlreadyReceived)?;
        Ok(pending.interaction_id.clone())
    }

    /// Clears the pending entry for `run_id`, signaling any waiter to wake up
    /// canceled. Idempotent: closing an already-cleared `done` is a no-op.
    pub fn clear(&self, run_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(mut pending) = inner.pending.remove(run_id) {
            if let Some(done_tx) = pending.done_tx.take() {
                let _ = done_tx.send(());
            }
        }
    }

    pub fn get_pending(&self, run_id: &str) -> Option<PendingSnapshot> {
        self.inner.lock().unwrap().pending.get(run_id).map(|p| PendingSnapshot {
            interaction_id: p.interaction_id.clone(),
            project_id: p.project_id.clone(),
            worker_key: p.worker_key.clone(),
            prompt: p.prompt.clone(),
        })
    }

    /// Reverse of [`Self::conversation_id_by_run`]: the run currently mapped
    /// to `conversation_id`, if any has been established.
    pub fn run_id_by_conversation(&self, conversation_id: &str) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .run_by_conversation
            .get(conversation_id)
            .cloned()
    }

    pub fn conversation_id_by_run(&self, run_id: &str) -> String {
        let inner = self.inner.lock().unwrap();
        inner
            .conversation_by_run
            .get(run_id)
            .cloned()
            .unwrap_or_else(|| run_id.to_string())
    }

    /// Establishes a run↔conversation mapping on first use, defaulting to an
    /// identity mapping (`conversation_id == run_id`).
    pub fn ensure_conversation(&self, run_id: &str, conversation_id: Option<&str>) -> String {
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner.conversation_by_run.get(run_id) {
            return existing.clone();
        }
        let cid = conversation_id.map(str::to_string).unwrap_or_else(|| run_id.to_string());
        inner.conversation_by_run.insert(run_id.to_string(), cid.clone());
        inner.run_by_conversation.insert(cid.clone(), run_id.to_string());
        cid
    }
}

fn now_nanos() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn s2_timeout_then_no_pending() {
        let mgr = InteractionManager::new();
        mgr.register_need_input("p", "r", "w", "q").unwrap();
        let err = mgr.wait_user_input("r", Duration::from_millis(10)).await.unwrap_err();
        assert_eq!(err, InteractionError::Timeout);
        let err = mgr.wait_user_input("r", Duration::from_millis(10)).await.unwrap_err();
        assert_eq!(err, InteractionError::NoPending);
    }

    #[test]
    fn s3_double_register_fails_first_still_resolvable() {
        let mgr = InteractionManager::new();
        mgr.register_need_input("p", "r", "w", "q1").unwrap();
        let err = mgr.register_need_input("p", "r", "w", "q2").unwrap_err();
        assert_eq!(err, InteractionError::AlreadyPending);
        let pending = mgr.get_pending("r").unwrap();
        assert_eq!(pending.prompt, "q1");
    }

    #[tokio::test]
    async fn submit_then_wait_resolves_with_input() {
        let mgr = std::sync::Arc::new(InteractionManager::new());
        let interaction_id = mgr.register_need_input("p", "r", "w", "q").unwrap();

        let waiter = {
            let mgr = mgr.clone();
            tokio::spawn(async move { mgr.wait_user_input("r", Duration::from_secs(1)).await })
        };
        // give the spawned task a chance to register interest, then submit.
        tokio::task::yield_now().await;
        mgr.submit_user_input("p", "r", Some(&interaction_id), "hello".to_string())
            .unwrap();
        let got = waiter.await.unwrap().unwrap();
        assert_eq!(got, "hello");
    }

    #[test]
    fn submit_with_mismatched_project_fails() {
        let mgr = InteractionManager::new();
        mgr.register_need_input("p", "r", "w", "q").unwrap();
        let err = mgr
            .submit_user_input("other", "r", None, "x".to_string())
            .unwrap_err();
        assert_eq!(err, InteractionError::Mismatch);
    }

    #[test]
    fn submit_with_soft_mismatched_interaction_id_still_accepted() {
        let mgr = InteractionManager::new();
        mgr.register_need_input("p", "r", "w", "q").unwrap();
        let ok = mgr.submit_user_input("p", "r", Some("wrong-id"), "x".to_string());
        assert!(ok.is_ok());
    }

    #[test]
    fn active_run_tracking() {
        let mgr = InteractionManager::new();
        assert_eq!(mgr.active_run_id("p"), None);
        mgr.mark_run_started("p", "r1");
        assert_eq!(mgr.active_run_id("p"), Some("r1".to_string()));
        mgr.mark_run_finished("p", "r1");
        assert_eq!(mgr.active_run_id("p"), None);
    }

    #[test]
    fn ensure_conversation_defaults_to_identity() {
        let mgr = InteractionManager::new();
        let cid = mgr.ensure_conversation("run-1", None);
        assert_eq!(cid, "run-1");
        assert_eq!(mgr.conversation_id_by_run("run-1"), "run-1");
    }

    #[test]
    fn run_id_by_conversation_resolves_custom_conversation_id() {
        let mgr = InteractionManager::new();
        let cid = mgr.ensure_conversation("run-1", Some("conv-custom"));
        assert_eq!(cid, "conv-custom");
        assert_eq!(mgr.run_id_by_conversation("conv-custom"), Some("run-1".to_string()));
        assert_eq!(mgr.run_id_by_conversation("unknown"), None);
    }
}
