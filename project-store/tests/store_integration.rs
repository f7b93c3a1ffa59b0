//! Integration tests exercising `JsonFileStore` and `SqliteProjectStore`
//! through the shared `ProjectStore` trait, plus `ProjectRegistry`'s
//! `ensure_run_context` caching.

use std::sync::Arc;

use project_store::{JsonFileStore, Project, ProjectRegistry, ProjectStore, SqliteProjectStore};
use tempfile::{tempdir, NamedTempFile};

async fn backend_round_trips_project_lifecycle(store: Arc<dyn ProjectStore>) {
    store
        .put_project(Project::new("p1", "u1", 100))
        .await
        .unwrap();
    store
        .put_project(Project::new("p2", "u1", 200))
        .await
        .unwrap();

    let got = store.get_project("p1").await.unwrap().unwrap();
    assert_eq!(got.name, "Project");
    assert!(!got.is_active);

    store.set_active_for_user("u1", "p1").await.unwrap();
    store.set_active_for_user("u1", "p2").await.unwrap();
    let active = store.get_active_by_user("u1").await.unwrap().unwrap();
    assert_eq!(active.project_id, "p2");
    assert!(!store.get_project("p1").await.unwrap().unwrap().is_active);

    let updated = store
        .update(
            "p2",
            Box::new(|p| {
                p.name = "  renamed project  ".to_string();
                p.active_run_id = Some("run-1".to_string());
                p.running = true;
            }),
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "renamed project");
    assert!(updated.running);

    let list = store.list_by_user("u1").await.unwrap();
    assert_eq!(list.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn json_file_store_round_trips_project_lifecycle() {
    let dir = tempdir().unwrap();
    let store: Arc<dyn ProjectStore> = Arc::new(JsonFileStore::new(dir.path().join("project_states.json")));
    backend_round_trips_project_lifecycle(store).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn sqlite_project_store_round_trips_project_lifecycle() {
    let file = NamedTempFile::new().unwrap();
    let store: Arc<dyn ProjectStore> = Arc::new(SqliteProjectStore::new(file.path()).unwrap());
    backend_round_trips_project_lifecycle(store).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn sqlite_project_store_reopens_same_path() {
    let file = NamedTempFile::new().unwrap();
    let path = file.path().to_path_buf();

    let store1 = SqliteProjectStore::new(&path).unwrap();
    store1.put_project(Project::new("p1", "u1", 1)).await.unwrap();
    drop(store1);

    let store2 = SqliteProjectStore::new(&path).unwrap();
    let got = store2.get_project("p1").await.unwrap().unwrap();
    assert_eq!(got.project_id, "p1");
}

#[tokio::test(flavor = "multi_thread")]
async fn project_registry_ensure_run_context_builds_once_and_caches() {
    let dir = tempdir().unwrap();
    let store: Arc<dyn ProjectStore> = Arc::new(JsonFileStore::new(dir.path().join("project_states.json")));
    store.put_project(Project::new("p1", "u1", 1)).await.unwrap();

    let registry = ProjectRegistry::new(store, Some(dir.path().to_path_buf()), dir.path().join("artifacts"));
    let ctx1 = registry.ensure_run_context("p1").await.unwrap();
    let ctx2 = registry.ensure_run_context("p1").await.unwrap();
    assert!(Arc::ptr_eq(&ctx1, &ctx2));
    assert_eq!(ctx1.id, "p1");
}
