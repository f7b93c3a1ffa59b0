//! Wire-level event types shared by the run stream and the chat projection.
//!
//! `RunEvent` is what `WatchRun` sends; `ChatEvent` is what `WatchChat` sends after
//! the Chat Event Mapper projects a run event into conversation terms. Both carry
//! their envelope fields (`session_id`/`node_id`/`event_id`) injected via
//! [`crate::envelope`] rather than as struct fields, so a single injection path
//! works for either kind.

use serde::Serialize;
use serde_json::Value;

/// One `WatchRun` stream event.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunEvent {
    Log { message: String },
    Progress {
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        progress_percent: Option<u8>,
    },
    InputRequired {
        input_request_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        client_view: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        node: Option<Value>,
    },
    NodeReady {
        node: Value,
    },
    Complete {
        #[serde(skip_serializing_if = "Option::is_none")]
        client_view: Option<Value>,
    },
    Error {
        message: String,
    },
}

impl RunEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunEvent::Complete { .. } | RunEvent::Error { .. })
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// One `WatchChat` stream event, produced by the Chat Event Mapper from a `RunEvent`.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChatEvent {
    AssistantChunk {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        node: Option<Value>,
        is_responding: bool,
        send_locked: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        hint: Option<String>,
    },
    NeedInput {
        interaction_id: String,
        prompt: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        node: Option<Value>,
        send_locked: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        hint: Option<String>,
    },
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        node: Option<Value>,
        send_locked: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        hint: Option<String>,
    },
    Complete {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        node: Option<Value>,
        send_locked: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        hint: Option<String>,
    },
}

impl ChatEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChatEvent::Complete { .. } | ChatEvent::Error { .. })
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
