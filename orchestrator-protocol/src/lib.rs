//! Wire protocol for the gateway's run and chat streams: event shapes plus the
//! envelope (`session_id`/`node_id`/`event_id`) injected into every line.
//!
//! This crate has no dependency on the orchestration engine itself — `orchestrator`
//! produces `RunEvent`/`ChatEvent` values and calls [`to_json`] to serialize them;
//! `gateway-serve` forwards the resulting JSON to transport.

pub mod envelope;
pub mod event;

pub use envelope::{to_json, Envelope, EnvelopeState, ToWireValue};
pub use event::{ChatEvent, RunEvent};
