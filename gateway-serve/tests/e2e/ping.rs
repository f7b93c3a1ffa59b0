use crate::common::{connect, recv_json, send_json, spawn_server_once};

#[tokio::test]
async fn ping_returns_pong_with_same_id() {
    let (ws_url, handle, _dir) = spawn_server_once().await;
    let mut socket = connect(&ws_url).await;

    send_json(&mut socket, serde_json::json!({"type": "ping", "id": "1"})).await;
    let resp = recv_json(&mut socket).await;

    assert_eq!(resp["type"], "pong");
    assert_eq!(resp["id"], "1");

    drop(socket);
    handle.await.unwrap();
}
