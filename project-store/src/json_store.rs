//! JSON-file-backed `ProjectStore`: a single array of [`Project`] records at
//! `tmp/project_states.json` (or any path the caller supplies), serialized
//! through the `Project` struct rather than a raw `serde_json::Value` map so
//! the field order on disk is stable.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::ProjectStoreError;
use crate::project::{normalize, Project};
use crate::{ProjectMutator, ProjectStore};

pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn read_all(&self) -> Result<Vec<Project>, ProjectStoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => {
                if contents.trim().is_empty() {
                    return Ok(Vec::new());
                }
                serde_json::from_str(&contents).map_err(|e| ProjectStoreError::Storage(e.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(ProjectStoreError::Storage(e.to_string())),
        }
    }

    fn write_all(&self, projects: &[Project]) -> Result<(), ProjectStoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ProjectStoreError::Storage(e.to_string()))?;
        }
        let contents =
            serde_json::to_string_pretty(projects).map_err(|e| ProjectStoreError::Storage(e.to_string()))?;
        std::fs::write(&self.path, contents).map_err(|e| ProjectStoreError::Storage(e.to_string()))
    }
}

#[async_trait]
impl ProjectStore for JsonFileStore {
    async fn get_project(&self, project_id: &str) -> Result<Option<Project>, ProjectStoreError> {
        let _guard = self.lock.lock().unwrap();
        Ok(self
            .read_all()?
            .into_iter()
            .find(|p| p.project_id == project_id))
    }

    async fn put_project(&self, mut project: Project) -> Result<(), ProjectStoreError> {
        let _guard = self.lock.lock().unwrap();
        normalize(&mut project);
        let mut projects = self.read_all()?;
        match projects.iter_mut().find(|p| p.project_id == project.project_id) {
            Some(existing) => *existing = project,
            None => projects.push(project),
        }
        self.write_all(&projects)
    }

    async fn update(
        &self,
        project_id: &str,
        mutator: ProjectMutator,
    ) -> Result<Project, ProjectStoreError> {
        let _guard = self.lock.lock().unwrap();
        let mut projects = self.read_all()?;
        let project = projects
            .iter_mut()
            .find(|p| p.project_id == project_id)
            .ok_or_else(|| ProjectStoreError::NotFound(project_id.to_string()))?;
        mutator(project);
        normalize(project);
        let updated = project.clone();
        self.write_all(&projects)?;
        Ok(updated)
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Project>, ProjectStoreError> {
        let _guard = self.lock.lock().unwrap();
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|p| p.user_id == user_id)
            .collect())
    }

    async fn get_active_by_user(&self, user_id: &str) -> Result<Option<Project>, ProjectStoreError> {
        let _guard = self.lock.lock().unwrap();
        Ok(self
            .read_all()?
            .into_iter()
            .find(|p| p.user_id == user_id && p.is_active))
    }

    async fn set_active_for_user(
        &self,
        user_id: &str,
        project_id: &str,
    ) -> Result<(), ProjectStoreError> {
        let _guard = self.lock.lock().unwrap();
        let mut projects = self.read_all()?;
        let found = projects.iter().any(|p| p.project_id == project_id && p.user_id == user_id);
        if !found {
            return Err(ProjectStoreError::NotFound(project_id.to_string()));
        }
        for p in projects.iter_mut().filter(|p| p.user_id == user_id) {
            p.is_active = p.project_id == project_id;
        }
        self.write_all(&projects)
    }
}
