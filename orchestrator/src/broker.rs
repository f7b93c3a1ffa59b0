//! Event Broker: per-run buffered event channel with snapshot-on-subscribe and
//! delayed cleanup for late watchers.
//!
//! Grounded on `serve/src/run/stream.rs`'s per-run channel bridging,
//! generalized from a single live connection into a registry keyed by
//! `run_id` so `WatchRun` can attach (or reattach) after the run has already
//! started. The snapshot that makes reconnects consistent (current UI node /
//! pending interaction) is sent by the RPC façade before it starts forwarding
//! live events.
//!
//! Each run is backed by a small fan-out of bounded `mpsc` channels, one per
//! subscriber, rather than a `tokio::sync::broadcast`: a broadcast sender
//! never blocks on a full buffer, it evicts the oldest unread value for
//! lagging receivers instead, which would silently drop events. spec.md's
//! "Dropped-events are not permitted; if the buffer fills, the Executor
//! blocks" requires the producer-side backpressure bounded `mpsc` gives —
//! matching the teacher's own `run_agent_task` in
//! `serve/src/run/stream.rs`, which bridges through a bounded channel rather
//! than a lossy one.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;

use orchestrator_protocol::RunEvent;

/// Default retention window after a run's terminal event before its broker
/// entry is deleted.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(30);

pub type EventReceiver = mpsc::Receiver<RunEvent>;

struct RunChannel {
    buffer: usize,
    subscribers: Mutex<Vec<mpsc::Sender<RunEvent>>>,
}

/// Cloneable handle the executor emits through. Delivers to every current
/// subscriber's bounded channel, awaiting room in each rather than dropping.
#[derive(Clone)]
pub struct BrokerSender {
    channel: Arc<RunChannel>,
}

impl BrokerSender {
    /// Awaits delivery to every subscriber registered at call time. A
    /// subscriber that has disconnected (receiver dropped) is simply skipped;
    /// everything else backpressures the caller until it has room, so no
    /// event is ever silently evicted.
    pub async fn send(&self, event: RunEvent) {
        let subs = self.channel.subscribers.lock().unwrap().clone();
        for tx in subs {
            let _ = tx.send(event.clone()).await;
        }
    }
}

/// Registry of per-run event channels. The Worker Executor is the sole
/// producer for a run; `WatchRun` handlers are consumers.
#[derive(Default)]
pub struct EventBroker {
    channels: DashMap<String, Arc<RunChannel>>,
}

impl EventBroker {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Creates a buffered channel for `run_id` (buffer size clamped to at
    /// least 1) and registers it. Returns a receiver for the caller (normally
    /// discarded by the executor, which emits through [`Self::sender`]).
    pub fn allocate(&self, run_id: &str, buffer: usize) -> EventReceiver {
        let buffer = buffer.max(1);
        let (tx, rx) = mpsc::channel(buffer);
        let channel = Arc::new(RunChannel {
            buffer,
            subscribers: Mutex::new(vec![tx]),
        });
        self.channels.insert(run_id.to_string(), channel);
        rx
    }

    /// Subscribes to `run_id`'s live events, if the run is known. Each call
    /// registers an independent bounded receiver that only sees events sent
    /// after it subscribes — callers needing a consistent view of
    /// already-emitted state (pending interaction, latest UI node) must fetch
    /// that separately before subscribing.
    pub fn get(&self, run_id: &str) -> Option<EventReceiver> {
        let channel = self.channels.get(run_id)?.value().clone();
        let (tx, rx) = mpsc::channel(channel.buffer);
        channel.subscribers.lock().unwrap().push(tx);
        Some(rx)
    }

    /// Returns a sender handle for the executor to emit through.
    pub fn sender(&self, run_id: &str) -> Option<BrokerSender> {
        self.channels
            .get(run_id)
            .map(|e| BrokerSender { channel: e.value().clone() })
    }

    /// Removes the entry for `run_id` immediately. Prefer
    /// [`Self::schedule_cleanup`] from the executor so late subscribers have a
    /// chance to attach.
    pub fn remove(&self, run_id: &str) {
        self.channels.remove(run_id);
    }

    /// Schedules deletion of the `run_id` entry after `retention`, allowing a
    /// last round of late subscribers to discover and drain the channel.
    pub fn schedule_cleanup(self: &Arc<Self>, run_id: String, retention: Duration) {
        let broker = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(retention).await;
            broker.remove(&run_id);
            tracing::debug!(run_id = %run_id, "event broker: cleaned up run channel");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allocate_then_get_receives_live_events() {
        let broker = EventBroker::new();
        let _initial_rx = broker.allocate("run-1", 4);
        let mut rx = broker.get("run-1").expect("sender registered");
        let tx = broker.sender("run-1").unwrap();
        tx.send(RunEvent::Log {
            message: "hi".into(),
        })
        .await;
        let got = rx.recv().await.unwrap();
        assert!(matches!(got, RunEvent::Log { message } if message == "hi"));
    }

    #[tokio::test]
    async fn get_on_unknown_run_returns_none() {
        let broker = EventBroker::new();
        assert!(broker.get("no-such-run").is_none());
    }

    #[tokio::test]
    async fn late_subscriber_only_sees_events_after_subscribing() {
        let broker = EventBroker::new();
        let mut initial_rx = broker.allocate("run-1", 4);
        let tx = broker.sender("run-1").unwrap();
        tx.send(RunEvent::Log { message: "early".into() }).await;

        let mut rx = broker.get("run-1").unwrap();
        tx.send(RunEvent::Log { message: "late".into() }).await;

        let first = initial_rx.recv().await.unwrap();
        assert!(matches!(first, RunEvent::Log { message } if message == "early"));

        let got = rx.recv().await.unwrap();
        assert!(matches!(got, RunEvent::Log { message } if message == "late"));
    }

    #[tokio::test]
    async fn send_backpressures_on_a_full_subscriber_buffer() {
        let broker = EventBroker::new();
        let mut rx = broker.allocate("run-1", 1);
        let tx = broker.sender("run-1").unwrap();
        // Buffer holds 1; the first send fills it, the second must wait for
        // a receive rather than evicting the first (no lossy broadcast).
        tx.send(RunEvent::Log { message: "one".into() }).await;

        let tx2 = tx.clone();
        let blocked = tokio::spawn(async move {
            tx2.send(RunEvent::Log { message: "two".into() }).await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!blocked.is_finished(), "send should block while the buffer is full");

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, RunEvent::Log { message } if message == "one"));

        blocked.await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(matches!(second, RunEvent::Log { message } if message == "two"));
    }

    #[tokio::test]
    async fn schedule_cleanup_removes_after_retention() {
        let broker = Arc::new(EventBroker::new());
        let _rx = broker.allocate("run-1", 1);
        broker
            .clone()
            .schedule_cleanup("run-1".to_string(), Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(broker.get("run-1").is_none());
    }

    #[tokio::test]
    async fn remove_is_immediate() {
        let broker = EventBroker::new();
        let _rx = broker.allocate("run-1", 1);
        broker.remove("run-1");
        assert!(broker.get("run-1").is_none());
    }
}
