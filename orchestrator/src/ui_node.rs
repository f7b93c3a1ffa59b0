//! UI Node Store: latest UI node snapshot per run, for reconnect replay.
//!
//! Grounded on the same latest-value-per-key snapshot pattern as
//! [`crate::broker::EventBroker`] and an `EnvelopeState`-style
//! current-node tracking, specialized to hold a `serde_json::Value` payload
//! rather than an envelope field.

use dashmap::DashMap;
use serde_json::Value;

/// Maps `run_id -> latest UI node`. `get` returns an owned deep copy so
/// callers can't mutate the stored value through the returned reference.
#[derive(Default)]
pub struct UiNodeStore {
    nodes: DashMap<String, Value>,
}

impl UiNodeStore {
    pub fn new() -> Self {
        Self {
            nodes: DashMap::new(),
        }
    }

    pub fn set(&self, run_id: &str, node: Value) {
        self.nodes.insert(run_id.to_string(), node);
    }

    /// Returns a deep copy of the latest node for `run_id`, if any.
    pub fn get(&self, run_id: &str) -> Option<Value> {
        self.nodes.get(run_id).map(|v| v.clone())
    }

    pub fn clear(&self, run_id: &str) {
        self.nodes.remove(run_id);
    }
}
