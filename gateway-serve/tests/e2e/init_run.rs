use crate::common::{connect, recv_json, send_json, spawn_server_once};

#[tokio::test]
async fn init_run_creates_bootstrap_project_and_launches_bootstrap_run() {
    let (ws_url, handle, _dir) = spawn_server_once().await;
    let mut socket = connect(&ws_url).await;

    send_json(
        &mut socket,
        serde_json::json!({"type": "init_run", "id": "1", "user_id": "u1"}),
    )
    .await;
    let resp = recv_json(&mut socket).await;
    assert_eq!(resp["type"], "init_run");
    assert_eq!(resp["repo_name"], "");
    let project_id = resp["project_id"].as_str().unwrap().to_string();
    assert!(!project_id.is_empty());
    let bootstrap_run_id = resp["bootstrap_run_id"].as_str().unwrap().to_string();
    assert!(bootstrap_run_id.starts_with("bootstrap-"));

    send_json(
        &mut socket,
        serde_json::json!({"type": "watch_run", "id": "2", "run_id": bootstrap_run_id}),
    )
    .await;
    let event = recv_json(&mut socket).await;
    assert_eq!(event["type"], "run_event");
    assert_eq!(event["event"]["event_type"], "INPUT_REQUIRED");

    drop(socket);
    handle.await.unwrap();
}

#[tokio::test]
async fn init_run_reuses_existing_active_project_without_relaunching_bootstrap() {
    let (ws_url, handle, _dir) = spawn_server_once().await;
    let mut socket = connect(&ws_url).await;

    send_json(
        &mut socket,
        serde_json::json!({
            "type": "create_project",
            "id": "1",
            "user_id": "u1",
            "name": "Existing",
        }),
    )
    .await;
    let created = recv_json(&mut socket).await;
    let project_id = created["project"]["project_id"].as_str().unwrap().to_string();

    send_json(
        &mut socket,
        serde_json::json!({
            "type": "select_project",
            "id": "2",
            "user_id": "u1",
            "project_id": project_id,
        }),
    )
    .await;
    recv_json(&mut socket).await;

    send_json(
        &mut socket,
        serde_json::json!({"type": "init_run", "id": "3", "user_id": "u1"}),
    )
    .await;
    let resp = recv_json(&mut socket).await;
    assert_eq!(resp["type"], "init_run");
    assert_eq!(resp["project_id"], project_id);
    assert!(resp["bootstrap_run_id"].is_null());

    drop(socket);
    handle.await.unwrap();
}
