//! WebSocket connection lifecycle: recv loop and request dispatch.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use tokio::sync::oneshot;

use crate::app::AppState;
use crate::handlers;
use crate::protocol::{ClientRequest, ServerResponse};
use crate::response::send_response;

pub(crate) async fn handle_socket(
    mut socket: WebSocket,
    state: Arc<AppState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
) {
    while let Some(res) = socket.recv().await {
        let msg = match res {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("read error (client closed?): {}", e);
                let _ = socket.close().await;
                break;
            }
        };
        let text = match &msg {
            Message::Text(t) => t.clone(),
            Message::Binary(b) => String::from_utf8_lossy(b).into_owned(),
            Message::Close(_) => break,
            _ => continue,
        };

        if let Err(e) = handle_request_and_send(&text, &mut socket, &state).await {
            tracing::warn!("handle_request error: {}", e);
            let _ = socket.close().await;
            break;
        }
    }
    if let Some(tx) = shutdown_tx {
        let _ = tx.send(());
    }
}

async fn handle_request_and_send(
    text: &str,
    socket: &mut WebSocket,
    state: &Arc<AppState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let req: ClientRequest = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => {
            let resp = ServerResponse::error(None, format!("parse error: {e}"));
            send_response(socket, &resp).await?;
            return Ok(());
        }
    };

    match req {
        ClientRequest::StartRun {
            id,
            project_id,
            pipeline_id,
            params,
        } => {
            let resp = handlers::start_run(id, project_id, pipeline_id, params, state).await;
            send_response(socket, &resp).await?;
        }
        ClientRequest::SubmitInput {
            id,
            project_id,
            run_id,
            interaction_id,
            conversation_id,
            input,
        } => {
            let resp = handlers::submit_input(
                id,
                project_id,
                run_id,
                interaction_id,
                conversation_id,
                input,
                state,
            );
            send_response(socket, &resp).await?;
        }
        ClientRequest::WatchRun { id, run_id } => {
            handlers::watch_run(id, run_id, state, socket).await?;
        }
        ClientRequest::WatchChat {
            id,
            conversation_id,
            from_seq,
        } => {
            handlers::watch_chat(id, conversation_id, from_seq, state, socket).await?;
        }
        ClientRequest::ListProjects { id, user_id } => {
            let resp = handlers::list_projects(id, user_id, state).await;
            send_response(socket, &resp).await?;
        }
        ClientRequest::CreateProject {
            id,
            user_id,
            name,
            repo,
        } => {
            let resp = handlers::create_project(id, user_id, name, repo, state).await;
            send_response(socket, &resp).await?;
        }
        ClientRequest::SelectProject {
            id,
            user_id,
            project_id,
        } => {
            let resp = handlers::select_project(id, user_id, project_id, state).await;
            send_response(socket, &resp).await?;
        }
        ClientRequest::InitRun {
            id,
            user_id,
            repo_url,
        } => {
            let resp = handlers::init_run(id, user_id, repo_url, state).await;
            send_response(socket, &resp).await?;
        }
        ClientRequest::Ping { id } => {
            send_response(socket, &ServerResponse::Pong { id }).await?;
        }
    }
    Ok(())
}
