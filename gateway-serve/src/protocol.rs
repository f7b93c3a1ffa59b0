//! Wire requests/responses for the gateway's RPC facade. Generalizes a
//! tagged `ClientRequest`/`ServerResponse` enum pair (one request type
//! per websocket message, `id` echoed back on every response) from a
//! fixed ReAct/Run/ToolsList/Ping surface to the
//! StartRun/SubmitInput/WatchRun/WatchChat/ListProjects/CreateProject/
//! SelectProject/InitRun surface.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use project_store::Project;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    StartRun {
        id: String,
        project_id: String,
        pipeline_id: String,
        #[serde(default)]
        params: Value,
    },
    SubmitInput {
        id: String,
        project_id: String,
        #[serde(default)]
        run_id: Option<String>,
        #[serde(default)]
        interaction_id: Option<String>,
        #[serde(default)]
        conversation_id: Option<String>,
        input: String,
    },
    WatchRun {
        id: String,
        run_id: String,
    },
    WatchChat {
        id: String,
        conversation_id: String,
        #[serde(default)]
        from_seq: u64,
    },
    ListProjects {
        id: String,
        user_id: String,
    },
    CreateProject {
        id: String,
        user_id: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        repo: Option<String>,
    },
    SelectProject {
        id: String,
        user_id: String,
        project_id: String,
    },
    InitRun {
        id: String,
        #[serde(default)]
        user_id: Option<String>,
        #[serde(default)]
        repo_url: Option<String>,
    },
    Ping {
        id: String,
    },
}

impl ClientRequest {
    pub fn id(&self) -> &str {
        match self {
            ClientRequest::StartRun { id, .. }
            | ClientRequest::SubmitInput { id, .. }
            | ClientRequest::WatchRun { id, .. }
            | ClientRequest::WatchChat { id, .. }
            | ClientRequest::ListProjects { id, .. }
            | ClientRequest::CreateProject { id, .. }
            | ClientRequest::SelectProject { id, .. }
            | ClientRequest::InitRun { id, .. }
            | ClientRequest::Ping { id } => id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerResponse {
    StartRun {
        id: String,
        run_id: String,
    },
    SubmitInput {
        id: String,
        run_id: String,
        interaction_id: String,
        conversation_id: String,
        accepted: bool,
    },
    RunEvent {
        id: String,
        run_id: String,
        event: Value,
    },
    ChatEvent {
        id: String,
        conversation_id: String,
        seq: u64,
        event: Value,
    },
    ListProjects {
        id: String,
        projects: Vec<Project>,
    },
    Project {
        id: String,
        project: Project,
    },
    InitRun {
        id: String,
        project_id: String,
        repo_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        bootstrap_run_id: Option<String>,
    },
    Pong {
        id: String,
    },
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        error: String,
    },
}

impl ServerResponse {
    pub fn error(id: Option<String>, error: impl Into<String>) -> Self {
        ServerResponse::Error {
            id,
            error: error.into(),
        }
    }
}
