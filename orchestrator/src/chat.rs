//! Chat Event Mapper: projects `WatchRunResponse`-shaped [`RunEvent`]s into
//! conversation [`ChatEvent`]s, carrying interaction ids and the latest UI
//! node, and persists them per conversation with a monotonically increasing
//! sequence so `WatchChat` can replay from `from_seq` then go live.
//!
//! No existing per-conversation sequencing lived at this seam; grounded on
//! the same envelope/sequencing pattern as
//! `orchestrator-protocol::envelope` (`EnvelopeState`'s monotonic `event_id`),
//! generalized from "per-run event ordering" to "per-conversation event log".

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tokio::sync::broadcast;

use orchestrator_protocol::{ChatEvent, RunEvent};

use crate::interaction::InteractionManager;
use crate::ui_node::UiNodeStore;

const CONVERSATION_CHANNEL_CAPACITY: usize = 256;

struct ConversationLog {
    events: Mutex<Vec<(u64, ChatEvent)>>,
    live: broadcast::Sender<(u64, ChatEvent)>,
}

impl ConversationLog {
    fn new() -> Self {
        let (live, _rx) = broadcast::channel(CONVERSATION_CHANNEL_CAPACITY);
        Self {
            events: Mutex::new(Vec::new()),
            live,
        }
    }
}

/// Projects run events into chat events and maintains a per-conversation,
/// replayable event log.
pub struct ChatEventMapper {
    interactions: Arc<InteractionManager>,
    ui_nodes: Arc<UiNodeStore>,
    conversations: DashMap<String, ConversationLog>,
}

impl ChatEventMapper {
    pub fn new(interactions: Arc<InteractionManager>, ui_nodes: Arc<UiNodeStore>) -> Self {
        Self {
            interactions,
            ui_nodes,
            conversations: DashMap::new(),
        }
    }

    /// Projects one `RunEvent` into a `ChatEvent` per the run-event-to-chat-event
    /// mapping table. `run_id` is used to pull the latest UI node and, for
    /// `INPUT_REQUIRED`, the pending interaction's prompt. `NEED_INPUT` and
    /// `ERROR` lock the chat node (`send_locked=true`, `hint` carrying the
    /// prompt/error text); `COMPLETE` unlocks it.
    pub fn map_event(&self, run_id: &str, event: &RunEvent) -> ChatEvent {
        let latest_node = self.ui_nodes.get(run_id);
        match event {
            RunEvent::Log { message } => ChatEvent::AssistantChunk {
                message: message.clone(),
                node: latest_node,
                is_responding: true,
                send_locked: false,
                hint: None,
            },
            RunEvent::Progress { message, .. } => ChatEvent::AssistantChunk {
                message: message.clone().unwrap_or_default(),
                node: latest_node,
                is_responding: true,
                send_locked: false,
                hint: None,
            },
            RunEvent::NodeReady { node } => ChatEvent::AssistantChunk {
                message: String::new(),
                node: Some(node.clone()),
                is_responding: true,
                send_locked: false,
                hint: None,
            },
            RunEvent::InputRequired {
                input_request_id,
                node,
                ..
            } => {
                let prompt = self
                    .interactions
                    .get_pending(run_id)
                    .map(|p| p.prompt)
                    .unwrap_or_default();
                ChatEvent::NeedInput {
                    interaction_id: input_request_id.clone(),
                    prompt: prompt.clone(),
                    node: node.clone().or(latest_node),
                    send_locked: true,
                    hint: Some(prompt),
                }
            }
            RunEvent::Error { message } => ChatEvent::Error {
                message: message.clone(),
                node: latest_node,
                send_locked: true,
                hint: Some(message.clone()),
            },
            RunEvent::Complete { client_view } => ChatEvent::Complete {
                text: client_view
                    .as_ref()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default(),
                node: None,
                send_locked: false,
                hint: None,
            },
        }
    }

    fn log(&self, conversation_id: &str) -> dashmap::mapref::one::Ref<'_, String, ConversationLog> {
        self.conversations
            .entry(conversation_id.to_string())
            .or_insert_with(ConversationLog::new)
            .downgrade()
    }

    /// Projects and appends `event` to `conversation_id`'s log, returning the
    /// sequence number assigned.
    pub fn project_and_record(&self, conversation_id: &str, run_id: &str, event: &RunEvent) -> (u64, ChatEvent) {
        let chat_event = self.map_event(run_id, event);
        let log = self.log(conversation_id);
        let seq = {
            let mut events = log.events.lock().unwrap();
            let seq = events.len() as u64 + 1;
            events.push((seq, chat_event.clone()));
            seq
        };
        let _ = log.live.send((seq, chat_event.clone()));
        (seq, chat_event)
    }

    /// Returns the persisted snapshot (events with seq > `from_seq`) plus a
    /// receiver for events recorded after this call. Resumed streams are not
    /// guaranteed byte-for-byte identical to the original live transport
    /// framing, only logically equivalent.
    pub fn subscribe(
        &self,
        conversation_id: &str,
        from_seq: u64,
    ) -> (Vec<(u64, ChatEvent)>, broadcast::Receiver<(u64, ChatEvent)>) {
        let log = self.log(conversation_id);
        let rx = log.live.subscribe();
        let snapshot = log
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|(seq, _)| *seq > from_seq)
            .cloned()
            .collect();
        (snapshot, rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mapper() -> ChatEventMapper {
        ChatEventMapper::new(
            Arc::new(InteractionManager::new()),
            Arc::new(UiNodeStore::new()),
        )
    }

    #[test]
    fn log_maps_to_assistant_chunk() {
        let m = mapper();
        let ev = m.map_event(
            "run-1",
            &RunEvent::Log {
                message: "hello".into(),
            },
        );
        assert!(matches!(ev, ChatEvent::AssistantChunk { message, is_responding, send_locked, .. }
            if message == "hello" && is_responding && !send_locked));
    }

    #[test]
    fn input_required_carries_prompt_from_interaction_manager() {
        let interactions = Arc::new(InteractionManager::new());
        let id = interactions
            .register_need_input("p", "run-1", "w", "pick one")
            .unwrap();
        let m = ChatEventMapper::new(interactions, Arc::new(UiNodeStore::new()));
        let ev = m.map_event(
            "run-1",
            &RunEvent::InputRequired {
                input_request_id: id.clone(),
                client_view: None,
                node: None,
            },
        );
        match ev {
            ChatEvent::NeedInput {
                interaction_id,
                prompt,
                send_locked,
                hint,
                ..
            } => {
                assert_eq!(interaction_id, id);
                assert_eq!(prompt, "pick one");
                assert!(send_locked);
                assert_eq!(hint.as_deref(), Some("pick one"));
            }
            other => panic!("expected NeedInput, got {other:?}"),
        }
    }

    #[test]
    fn error_maps_to_error_event() {
        let m = mapper();
        let ev = m.map_event(
            "run-1",
            &RunEvent::Error {
                message: "boom".into(),
            },
        );
        assert!(matches!(ev, ChatEvent::Error { message, send_locked, hint, .. }
            if message == "boom" && send_locked && hint.as_deref() == Some("boom")));
    }

    #[test]
    fn complete_unlocks_the_chat_node() {
        let m = mapper();
        let ev = m.map_event(
            "run-1",
            &RunEvent::Complete {
                client_view: Some(json!("done")),
            },
        );
        assert!(matches!(ev, ChatEvent::Complete { send_locked, hint, .. }
            if !send_locked && hint.is_none()));
    }

    #[tokio::test]
    async fn record_then_subscribe_replays_from_seq() {
        let m = mapper();
        m.project_and_record(
            "conv-1",
            "run-1",
            &RunEvent::Log {
                message: "one".into(),
            },
        );
        let (seq2, _) = m.project_and_record(
            "conv-1",
            "run-1",
            &RunEvent::Log {
                message: "two".into(),
            },
        );

        let (snapshot, _rx) = m.subscribe("conv-1", 1);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].0, seq2);
    }

    #[tokio::test]
    async fn subscribe_live_receives_events_recorded_after() {
        let m = mapper();
        let (_, mut rx) = m.subscribe("conv-1", 0);
        m.project_and_record(
            "conv-1",
            "run-1",
            &RunEvent::Complete { client_view: Some(json!("done")) },
        );
        let (seq, event) = rx.recv().await.unwrap();
        assert_eq!(seq, 1);
        assert!(matches!(event, ChatEvent::Complete { text, .. } if text == "done"));
    }
}
