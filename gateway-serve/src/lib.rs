//! WebSocket RPC facade for the analysis-pipeline gateway (axum + ws).
//!
//! Listens on ws://127.0.0.1:8080 by default, dispatching `start_run`,
//! `submit_input`, `watch_run`, `watch_chat`, `list_projects`,
//! `create_project`, `select_project`, `init_run`, and `ping` requests.
//!
//! **Public API**: [`run_serve`], [`run_serve_on_listener`].

mod app;
mod connection;
mod handlers;
mod protocol;
mod response;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::info;

use orchestrator::{ChatEventMapper, EventBroker, InteractionManager, TraceLogger, UiNodeStore, WorkerExecutor};
use project_store::{JsonFileStore, ProjectRegistry, ProjectStore, SqliteProjectStore};

use app::{router, AppState};

const DEFAULT_WS_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_PROJECT_STORE_PATH: &str = "tmp/project_states.json";
const DEFAULT_TRACE_DIR: &str = "tmp/run_logs";
const DEFAULT_ARTIFACTS_ROOT: &str = "artifacts";

/// Chooses a `ProjectStore` backend from the environment: `PROJECT_STORE_PG_DSN`,
/// when set, names a SQLite database file the engine treats as the "SQL"
/// backend (the persistence-duality design: a single `Store` capability
/// behind identical operations, chosen at initialization); otherwise falls
/// back to the JSON file store.
fn project_store_from_env() -> Result<Arc<dyn ProjectStore>, Box<dyn std::error::Error + Send + Sync>> {
    if let Ok(dsn) = std::env::var("PROJECT_STORE_PG_DSN") {
        let store = SqliteProjectStore::new(&dsn)?;
        return Ok(Arc::new(store));
    }
    Ok(Arc::new(JsonFileStore::new(DEFAULT_PROJECT_STORE_PATH)))
}

fn build_state(shutdown_tx: Option<oneshot::Sender<()>>) -> Result<Arc<AppState>, Box<dyn std::error::Error + Send + Sync>> {
    let interactions = Arc::new(InteractionManager::new());
    let broker = Arc::new(EventBroker::new());
    let ui_nodes = Arc::new(UiNodeStore::new());
    let trace = Arc::new(TraceLogger::new(DEFAULT_TRACE_DIR));
    let executor = Arc::new(WorkerExecutor::new(
        interactions.clone(),
        broker,
        ui_nodes.clone(),
        trace,
    ));
    let chat = Arc::new(ChatEventMapper::new(interactions, ui_nodes));

    let repos_root = std::env::var("REPOS_ROOT").ok().map(PathBuf::from);
    let store = project_store_from_env()?;
    let projects = Arc::new(ProjectRegistry::new(store, repos_root, PathBuf::from(DEFAULT_ARTIFACTS_ROOT)));

    Ok(Arc::new(AppState {
        shutdown_tx: Arc::new(Mutex::new(shutdown_tx)),
        executor,
        chat,
        projects,
    }))
}

/// Runs the WebSocket server on an existing listener. Used by tests (bind to 127.0.0.1:0 then pass listener).
/// When `once` is true, accepts one connection, handles it, then returns.
pub async fn run_serve_on_listener(
    listener: TcpListener,
    once: bool,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = listener.local_addr()?;
    info!("WebSocket server listening on ws://{}", addr);
    if once {
        info!("will exit after first connection is done (once mode, used by tests)");
    }

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let state = build_state(if once { Some(shutdown_tx) } else { None })?;
    let app = router(state);

    if once {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await?;
        info!("connection done, exiting (once mode)");
    } else {
        axum::serve(listener, app).await?;
    }
    Ok(())
}

/// Runs the WebSocket server. Listens on `addr` (default 127.0.0.1:8080).
/// When `once` is true, accepts one connection, handles it, then returns (process exits).
pub async fn run_serve(
    addr: Option<&str>,
    once: bool,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = addr.unwrap_or(DEFAULT_WS_ADDR);
    let listener = TcpListener::bind(addr).await?;
    run_serve_on_listener(listener, once).await
}
