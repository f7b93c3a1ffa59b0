//! One function per `ClientRequest` variant. `StartRun`/`SubmitInput`/
//! `ListProjects`/`CreateProject`/`SelectProject`/`InitRun` return a single
//! `ServerResponse`; `WatchRun`/`WatchChat` own the socket for as long as
//! their stream runs, sending a snapshot then forwarding live events until a
//! terminal event, a send failure, or the channel closing.
//!
//! Generalizes `serve/src/run/request.rs`'s validate-then-dispatch split and
//! `serve/src/run/delivery.rs::handle_run_stream`'s snapshot-then-forward-live
//! loop for reconnect snapshots.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::ws::WebSocket;
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use orchestrator_protocol::{ChatEvent, RunEvent};

use crate::app::AppState;
use crate::protocol::ServerResponse;
use crate::response::send_response;

/// Buffer depth for a freshly launched run's event channel.
const EVENT_BUFFER: usize = 64;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

pub(crate) async fn start_run(
    id: String,
    project_id: String,
    pipeline_id: String,
    params: Value,
    state: &Arc<AppState>,
) -> ServerResponse {
    let project_id = project_id.trim().to_string();
    if project_id.is_empty() {
        return ServerResponse::error(Some(id), "project_id is required");
    }
    let worker_key = pipeline_id.trim().to_string();
    if worker_key.is_empty() {
        return ServerResponse::error(Some(id), "pipeline_id is required");
    }

    let ctx = match state.projects.ensure_run_context(&project_id).await {
        Ok(ctx) => ctx,
        Err(e) => return ServerResponse::error(Some(id), format!("ensure_run_context: {e}")),
    };

    let worker = match ctx.resolver.resolve(&worker_key) {
        Some(w) => w,
        None => return ServerResponse::error(Some(id), format!("unknown pipeline: {worker_key}")),
    };

    let user_input = params
        .get("user_input")
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim()
        .to_string();

    let (run_id, rx) = state
        .executor
        .launch(project_id, worker_key, worker, user_input, EVENT_BUFFER);

    let conversation_id = state.executor.interactions.ensure_conversation(&run_id, None);
    spawn_chat_bridge(state.chat.clone(), conversation_id, run_id.clone(), rx);

    ServerResponse::StartRun { id, run_id }
}

/// Feeds every event off a run's broker receiver into the Chat Event Mapper
/// so the per-conversation log fills in regardless of whether a `WatchChat`
/// client is attached. Stops once a terminal event is projected or the
/// channel closes.
fn spawn_chat_bridge(
    chat: Arc<orchestrator::ChatEventMapper>,
    conversation_id: String,
    run_id: String,
    mut rx: orchestrator::EventReceiver,
) {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let terminal = event.is_terminal();
            chat.project_and_record(&conversation_id, &run_id, &event);
            if terminal {
                break;
            }
        }
    });
}

pub(crate) fn submit_input(
    id: String,
    project_id: String,
    run_id: Option<String>,
    interaction_id: Option<String>,
    conversation_id: Option<String>,
    input: String,
    state: &Arc<AppState>,
) -> ServerResponse {
    let project_id = project_id.trim().to_string();
    if project_id.is_empty() {
        return ServerResponse::error(Some(id), "project_id is required");
    }
    if input.trim().is_empty() {
        return ServerResponse::error(Some(id), "input is required");
    }

    let run_id = run_id
        .filter(|r| !r.trim().is_empty())
        .or_else(|| state.executor.interactions.active_run_id(&project_id));
    let run_id = match run_id {
        Some(r) => r,
        None => return ServerResponse::error(Some(id), "no active run for project"),
    };

    let conversation_id = conversation_id
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| state.executor.interactions.conversation_id_by_run(&run_id));

    match state
        .executor
        .interactions
        .submit_user_input(&project_id, &run_id, interaction_id.as_deref(), input)
    {
        Ok(resolved_interaction_id) => ServerResponse::SubmitInput {
            id,
            run_id,
            interaction_id: resolved_interaction_id,
            conversation_id,
            accepted: true,
        },
        Err(e) => ServerResponse::error(Some(id), e.to_string()),
    }
}

pub(crate) async fn watch_run(
    id: String,
    run_id: String,
    state: &Arc<AppState>,
    socket: &mut WebSocket,
) -> Result<(), BoxError> {
    let mut rx = match state.executor.broker.get(&run_id) {
        Some(rx) => rx,
        None => {
            let resp = ServerResponse::error(Some(id), format!("unknown run: {run_id}"));
            return send_response(socket, &resp).await;
        }
    };

    // Snapshot first: a pending interaction wins over the latest UI node,
    // mirroring the same precedence the executor itself emits live.
    if let Some(pending) = state.executor.interactions.get_pending(&run_id) {
        let snapshot = RunEvent::InputRequired {
            input_request_id: pending.interaction_id,
            client_view: None,
            node: state.executor.ui_nodes.get(&run_id),
        };
        send_run_event(socket, &id, &run_id, &snapshot).await?;
    } else if let Some(node) = state.executor.ui_nodes.get(&run_id) {
        send_run_event(socket, &id, &run_id, &RunEvent::NodeReady { node }).await?;
    }

    while let Some(event) = rx.recv().await {
        let terminal = event.is_terminal();
        send_run_event(socket, &id, &run_id, &event).await?;
        if terminal {
            break;
        }
    }
    Ok(())
}

async fn send_run_event(
    socket: &mut WebSocket,
    id: &str,
    run_id: &str,
    event: &RunEvent,
) -> Result<(), BoxError> {
    let value = event
        .to_value()
        .unwrap_or_else(|_| serde_json::json!({"error": "serialize"}));
    send_response(
        socket,
        &ServerResponse::RunEvent {
            id: id.to_string(),
            run_id: run_id.to_string(),
            event: value,
        },
    )
    .await
}

pub(crate) async fn watch_chat(
    id: String,
    conversation_id: String,
    from_seq: u64,
    state: &Arc<AppState>,
    socket: &mut WebSocket,
) -> Result<(), BoxError> {
    let (snapshot, mut rx) = state.chat.subscribe(&conversation_id, from_seq);

    for (seq, event) in snapshot {
        let terminal = event.is_terminal();
        send_chat_event(socket, &id, &conversation_id, seq, &event).await?;
        if terminal {
            return Ok(());
        }
    }

    loop {
        match rx.recv().await {
            Ok((seq, event)) => {
                let terminal = event.is_terminal();
                send_chat_event(socket, &id, &conversation_id, seq, &event).await?;
                if terminal {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    Ok(())
}

async fn send_chat_event(
    socket: &mut WebSocket,
    id: &str,
    conversation_id: &str,
    seq: u64,
    event: &ChatEvent,
) -> Result<(), BoxError> {
    let value = event
        .to_value()
        .unwrap_or_else(|_| serde_json::json!({"error": "serialize"}));
    send_response(
        socket,
        &ServerResponse::ChatEvent {
            id: id.to_string(),
            conversation_id: conversation_id.to_string(),
            seq,
            event: value,
        },
    )
    .await
}

pub(crate) async fn list_projects(id: String, user_id: String, state: &Arc<AppState>) -> ServerResponse {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return ServerResponse::error(Some(id), "user_id is required");
    }
    match state.projects.list_by_user(user_id).await {
        Ok(projects) => ServerResponse::ListProjects { id, projects },
        Err(e) => ServerResponse::error(Some(id), e.to_string()),
    }
}

pub(crate) async fn create_project(
    id: String,
    user_id: String,
    name: Option<String>,
    repo: Option<String>,
    state: &Arc<AppState>,
) -> ServerResponse {
    let user_id = user_id.trim().to_string();
    if user_id.is_empty() {
        return ServerResponse::error(Some(id), "user_id is required");
    }

    let project_id = Uuid::new_v4().to_string();
    let mut project = project_store::Project::new(&project_id, &user_id, now_ms());
    if let Some(name) = name {
        project.name = name;
    }
    if let Some(repo) = repo {
        project.repo = repo;
    }
    project_store::normalize(&mut project);

    match state.projects.put_project(project.clone()).await {
        Ok(()) => ServerResponse::Project { id, project },
        Err(e) => ServerResponse::error(Some(id), e.to_string()),
    }
}

pub(crate) async fn select_project(
    id: String,
    user_id: String,
    project_id: String,
    state: &Arc<AppState>,
) -> ServerResponse {
    let user_id = user_id.trim();
    let project_id = project_id.trim();
    if user_id.is_empty() || project_id.is_empty() {
        return ServerResponse::error(Some(id), "user_id and project_id are required");
    }
    if let Err(e) = state.projects.set_active_for_user(user_id, project_id).await {
        return ServerResponse::error(Some(id), e.to_string());
    }
    match state.projects.get_project(project_id).await {
        Ok(Some(project)) => ServerResponse::Project { id, project },
        Ok(None) => ServerResponse::error(Some(id), format!("project not found after select: {project_id}")),
        Err(e) => ServerResponse::error(Some(id), e.to_string()),
    }
}

/// Resolves `user_id`'s active project or creates one rooted at `repo_url`
/// (empty for the bootstrap flow), ensures its run context builds, and — for
/// a freshly created bootstrap project — launches the `bootstrap` worker so
/// the caller gets a `bootstrap_run_id` to `WatchRun` immediately.
pub(crate) async fn init_run(
    id: String,
    user_id: Option<String>,
    repo_url: Option<String>,
    state: &Arc<AppState>,
) -> ServerResponse {
    let user_id = user_id.unwrap_or_default().trim().to_string();
    if user_id.is_empty() {
        return ServerResponse::error(Some(id), "user_id is required");
    }
    let repo = repo_url.unwrap_or_default().trim().to_string();

    let (project, created) = match state.projects.get_active_by_user(&user_id).await {
        Ok(Some(project)) => (project, false),
        Ok(None) => {
            let project_id = Uuid::new_v4().to_string();
            let mut project = project_store::Project::new(&project_id, &user_id, now_ms());
            project.repo = repo;
            project_store::normalize(&mut project);
            if let Err(e) = state.projects.put_project(project.clone()).await {
                return ServerResponse::error(Some(id), e.to_string());
            }
            if let Err(e) = state.projects.set_active_for_user(&user_id, &project_id).await {
                return ServerResponse::error(Some(id), e.to_string());
            }
            (project, true)
        }
        Err(e) => return ServerResponse::error(Some(id), e.to_string()),
    };

    let ctx = match state.projects.ensure_run_context(&project.project_id).await {
        Ok(ctx) => ctx,
        Err(e) => return ServerResponse::error(Some(id), format!("ensure_run_context: {e}")),
    };

    let bootstrap_run_id = if created && project.repo.is_empty() {
        ctx.resolver.resolve("bootstrap").map(|worker| {
            let (run_id, rx) = state.executor.launch(
                project.project_id.clone(),
                "bootstrap".to_string(),
                worker,
                String::new(),
                EVENT_BUFFER,
            );
            let conversation_id = state.executor.interactions.ensure_conversation(&run_id, None);
            spawn_chat_bridge(state.chat.clone(), conversation_id, run_id.clone(), rx);
            run_id
        })
    } else {
        None
    };

    ServerResponse::InitRun {
        id,
        project_id: project.project_id,
        repo_name: ctx.repo_name.clone(),
        bootstrap_run_id,
    }
}
