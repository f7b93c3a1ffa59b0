//! Project Registry: `GetProject`/`PutProject`/`Update`/`ListByUser`/
//! `GetActiveByUser`/`SetActiveForUser` over a persisted `Project` record,
//! plus `EnsureRunContext`, which rebuilds (and caches) a
//! [`orchestrator::RunContext`] through the Run Context Builder.
//!
//! A single-purpose SQLite store (`Mutex<Connection>`, `StoreError` enum,
//! `tokio::task::block_in_place` blocking methods) generalized into a
//! `ProjectStore` trait with two interchangeable backends.

mod error;
mod json_store;
mod project;
mod registry;
mod sqlite_store;

pub use error::ProjectStoreError;
pub use json_store::JsonFileStore;
pub use project::{normalize, Project};
pub use registry::ProjectRegistry;
pub use sqlite_store::SqliteProjectStore;

use async_trait::async_trait;

/// Mutation applied to a project under `ProjectStore::update`'s atomic
/// read-modify-write.
pub type ProjectMutator = Box<dyn FnOnce(&mut Project) + Send>;

/// Persistence boundary for project records. Implementations must apply
/// [`normalize`] to every record before it is considered stored, so both
/// backends produce identical output for identical input.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn get_project(&self, project_id: &str) -> Result<Option<Project>, ProjectStoreError>;

    async fn put_project(&self, project: Project) -> Result<(), ProjectStoreError>;

    /// Atomic read-modify-write: loads the project, applies `mutator`,
    /// normalizes, and persists the result. Fails with `NotFound` if the
    /// project does not exist.
    async fn update(
        &self,
        project_id: &str,
        mutator: ProjectMutator,
    ) -> Result<Project, ProjectStoreError>;

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Project>, ProjectStoreError>;

    async fn get_active_by_user(&self, user_id: &str) -> Result<Option<Project>, ProjectStoreError>;

    /// Atomically marks `project_id` active and deactivates every other
    /// project owned by `user_id`.
    async fn set_active_for_user(
        &self,
        user_id: &str,
        project_id: &str,
    ) -> Result<(), ProjectStoreError>;
}
