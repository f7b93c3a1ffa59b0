//! Shared e2e harness: spawn one gateway-serve instance, speak WebSocket
//! client JSON at it, tear down after the single connection it was given.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Points the project store and repos root at a fresh temp directory so
/// concurrent test binaries don't trip over each other's state, then spawns
/// `run_serve_on_listener` in `once` mode (accepts exactly one connection).
pub async fn spawn_server_once() -> (String, JoinHandle<()>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var(
        "PROJECT_STORE_PG_DSN",
        dir.path().join("project_states.sqlite3"),
    );
    std::env::set_var("REPOS_ROOT", dir.path());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let ws_url = format!("ws://{addr}");

    let handle = tokio::spawn(async move {
        gateway_serve::run_serve_on_listener(listener, true)
            .await
            .unwrap();
    });

    (ws_url, handle, dir)
}

pub async fn connect(ws_url: &str) -> Socket {
    let (socket, _resp) = connect_async(ws_url).await.unwrap();
    socket
}

pub async fn send_json(socket: &mut Socket, value: serde_json::Value) {
    socket
        .send(Message::Text(value.to_string()))
        .await
        .unwrap();
}

pub async fn recv_json(socket: &mut Socket) -> serde_json::Value {
    loop {
        match socket.next().await.expect("connection closed early") {
            Ok(Message::Text(text)) => return serde_json::from_str(&text).unwrap(),
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(other) => panic!("unexpected message: {other:?}"),
            Err(e) => panic!("websocket error: {e}"),
        }
    }
}
