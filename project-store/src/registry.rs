//! `ProjectRegistry`: the Project Registry proper — a `ProjectStore` backend
//! plus an in-memory cache of built [`RunContext`]s, so `EnsureRunContext`
//! rebuilds through the Run Context Builder only when the cached one has
//! gone stale.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use orchestrator::run_context::{RunContext, RunContextBuilder, RunContextConfig};

use crate::error::ProjectStoreError;
use crate::project::Project;
use crate::{ProjectMutator, ProjectStore};

pub struct ProjectRegistry {
    store: Arc<dyn ProjectStore>,
    contexts: DashMap<String, Arc<RunContext>>,
    repos_root: Option<PathBuf>,
    artifacts_root: PathBuf,
}

impl ProjectRegistry {
    pub fn new(store: Arc<dyn ProjectStore>, repos_root: Option<PathBuf>, artifacts_root: PathBuf) -> Self {
        Self {
            store,
            contexts: DashMap::new(),
            repos_root,
            artifacts_root,
        }
    }

    pub async fn get_project(&self, project_id: &str) -> Result<Option<Project>, ProjectStoreError> {
        self.store.get_project(project_id).await
    }

    pub async fn put_project(&self, project: Project) -> Result<(), ProjectStoreError> {
        self.store.put_project(project).await
    }

    pub async fn update(
        &self,
        project_id: &str,
        mutator: ProjectMutator,
    ) -> Result<Project, ProjectStoreError> {
        self.store.update(project_id, mutator).await
    }

    pub async fn list_by_user(&self, user_id: &str) -> Result<Vec<Project>, ProjectStoreError> {
        self.store.list_by_user(user_id).await
    }

    pub async fn get_active_by_user(&self, user_id: &str) -> Result<Option<Project>, ProjectStoreError> {
        self.store.get_active_by_user(user_id).await
    }

    /// Atomically activates `project_id` and deactivates its siblings, then
    /// drops any cached context for it so the next `ensure_run_context` picks
    /// up the latest persisted `repo`.
    pub async fn set_active_for_user(
        &self,
        user_id: &str,
        project_id: &str,
    ) -> Result<(), ProjectStoreError> {
        self.store.set_active_for_user(user_id, project_id).await?;
        self.contexts.remove(project_id);
        Ok(())
    }

    /// Returns the cached context for `project_id` if one exists and every
    /// worker key it needs still resolves; otherwise rebuilds one via the Run
    /// Context Builder from the persisted project record.
    pub async fn ensure_run_context(&self, project_id: &str) -> Result<Arc<RunContext>, ProjectStoreError> {
        if let Some(cached) = self.contexts.get(project_id) {
            if cached.is_ready() {
                return Ok(cached.clone());
            }
        }

        let project = self
            .store
            .get_project(project_id)
            .await?
            .ok_or_else(|| ProjectStoreError::NotFound(project_id.to_string()))?;

        let config = RunContextConfig {
            project_id,
            repo: &project.repo,
            repos_root: self.repos_root.as_deref(),
            artifacts_root: &self.artifacts_root,
        };
        let ctx = Arc::new(
            RunContextBuilder::build(config).map_err(|e| ProjectStoreError::RunContext(e.to_string()))?,
        );
        self.contexts.insert(project_id.to_string(), ctx.clone());
        Ok(ctx)
    }

    /// Drops a project's cached context, forcing the next `ensure_run_context`
    /// call to rebuild it.
    pub fn evict(&self, project_id: &str) {
        self.contexts.remove(project_id);
    }
}
