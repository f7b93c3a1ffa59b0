use futures_util::SinkExt;
use tokio_tungstenite::tungstenite::Message;

use crate::common::{connect, recv_json, spawn_server_once};

#[tokio::test]
async fn malformed_message_gets_error_response() {
    let (ws_url, handle, _dir) = spawn_server_once().await;
    let mut socket = connect(&ws_url).await;

    socket.send(Message::Text("not json at all".into())).await.unwrap();
    let resp = recv_json(&mut socket).await;

    assert_eq!(resp["type"], "error");
    assert!(resp["error"].as_str().unwrap().contains("parse error"));

    drop(socket);
    handle.await.unwrap();
}
