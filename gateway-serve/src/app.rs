//! Axum app: state, router, and WebSocket upgrade handler.

use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::Response,
    routing::get,
    Router,
};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

use orchestrator::{ChatEventMapper, WorkerExecutor};
use project_store::ProjectRegistry;

use super::connection::handle_socket;

/// Shared state handed to every connection: the run engine, the chat
/// projection, and the project registry. When set, the first connection to
/// close sends on `shutdown_tx` to signal server exit (once mode, used by
/// tests).
pub(crate) struct AppState {
    pub(crate) shutdown_tx: Arc<Mutex<Option<oneshot::Sender<()>>>>,
    pub(crate) executor: Arc<WorkerExecutor>,
    pub(crate) chat: Arc<ChatEventMapper>,
    pub(crate) projects: Arc<ProjectRegistry>,
}

pub(crate) fn router(state: Arc<AppState>) -> Router {
    Router::new().route("/", get(ws_handler)).with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let shutdown_tx = state.shutdown_tx.lock().ok().and_then(|mut g| g.take());
    ws.on_upgrade(move |socket| handle_socket(socket, state, shutdown_tx))
}
