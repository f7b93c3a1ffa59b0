use crate::common::{connect, recv_json, send_json, spawn_server_once};

#[tokio::test]
async fn create_then_list_then_select_project() {
    let (ws_url, handle, _dir) = spawn_server_once().await;
    let mut socket = connect(&ws_url).await;

    send_json(
        &mut socket,
        serde_json::json!({
            "type": "create_project",
            "id": "1",
            "user_id": "u1",
            "name": "Demo",
        }),
    )
    .await;
    let created = recv_json(&mut socket).await;
    assert_eq!(created["type"], "project");
    assert_eq!(created["project"]["name"], "Demo");
    assert_eq!(created["project"]["user_id"], "u1");
    let project_id = created["project"]["project_id"].as_str().unwrap().to_string();

    send_json(
        &mut socket,
        serde_json::json!({"type": "list_projects", "id": "2", "user_id": "u1"}),
    )
    .await;
    let listed = recv_json(&mut socket).await;
    assert_eq!(listed["type"], "list_projects");
    let projects = listed["projects"].as_array().unwrap();
    assert!(projects.iter().any(|p| p["project_id"] == project_id));

    send_json(
        &mut socket,
        serde_json::json!({
            "type": "select_project",
            "id": "3",
            "user_id": "u1",
            "project_id": project_id,
        }),
    )
    .await;
    let selected = recv_json(&mut socket).await;
    assert_eq!(selected["type"], "project");
    assert_eq!(selected["project"]["is_active"], true);

    drop(socket);
    handle.await.unwrap();
}
