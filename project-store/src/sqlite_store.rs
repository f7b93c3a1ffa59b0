//! SQLite-backed `ProjectStore`: `project_states` plus `project_artifacts`,
//! generalized from a single-purpose `workspaces`/`workspace_threads` table
//! pair — same single
//! `Mutex<Connection>`, `StoreError`-style error mapping, and
//! `tokio::task::block_in_place` blocking-call pattern.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use async_trait::async_trait;
use rusqlite::OptionalExtension;

use crate::error::ProjectStoreError;
use crate::project::{normalize, Project};
use crate::{ProjectMutator, ProjectStore};

pub struct SqliteProjectStore {
    db: Arc<Mutex<rusqlite::Connection>>,
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn row_to_project(row: &rusqlite::Row) -> rusqlite::Result<Project> {
    Ok(Project {
        project_id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        repo: row.get(3)?,
        is_active: row.get::<_, i64>(4)? != 0,
        active_run_id: row.get(5)?,
        running: row.get::<_, i64>(6)? != 0,
        created_at_ms: row.get(7)?,
        updated_at_ms: row.get(8)?,
    })
}

impl SqliteProjectStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, ProjectStoreError> {
        let conn = rusqlite::Connection::open(path.as_ref())
            .map_err(|e| ProjectStoreError::Storage(e.to_string()))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS project_states (
                project_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                repo TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 0,
                active_run_id TEXT,
                running INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_project_states_user_id ON project_states(user_id);
            CREATE TABLE IF NOT EXISTS project_artifacts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id TEXT NOT NULL,
                run_id TEXT NOT NULL,
                path TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                UNIQUE(run_id, path),
                FOREIGN KEY (project_id) REFERENCES project_states(project_id)
            );
            CREATE INDEX IF NOT EXISTS idx_project_artifacts_project_id ON project_artifacts(project_id);
            "#,
        )
        .map_err(|e| ProjectStoreError::Storage(e.to_string()))?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Records an artifact path produced by `run_id`. Idempotent: a repeated
    /// `(run_id, path)` pair is a no-op.
    pub async fn add_artifact(
        &self,
        project_id: &str,
        run_id: &str,
        path: &str,
    ) -> Result<(), ProjectStoreError> {
        let db = self.db.clone();
        let (project_id, run_id, path) = (project_id.to_string(), run_id.to_string(), path.to_string());
        let created_at = now_ms();
        tokio::task::block_in_place(move || {
            let conn = db.lock().map_err(|_| ProjectStoreError::Storage("lock".into()))?;
            conn.execute(
                "INSERT OR IGNORE INTO project_artifacts (project_id, run_id, path, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![project_id, run_id, path, created_at],
            )
            .map_err(|e| ProjectStoreError::Storage(e.to_string()))?;
            Ok(())
        })
    }

    /// Lists artifact paths recorded for `run_id`, in insertion order.
    pub async fn list_artifacts(&self, run_id: &str) -> Result<Vec<String>, ProjectStoreError> {
        let db = self.db.clone();
        let run_id = run_id.to_string();
        tokio::task::block_in_place(move || {
            let conn = db.lock().map_err(|_| ProjectStoreError::Storage("lock".into()))?;
            let mut stmt = conn
                .prepare("SELECT path FROM project_artifacts WHERE run_id = ?1 ORDER BY id ASC")
                .map_err(|e| ProjectStoreError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map(rusqlite::params![run_id], |row| row.get::<_, String>(0))
                .map_err(|e| ProjectStoreError::Storage(e.to_string()))?;
            rows.collect::<Result<Vec<_>, _>>().map_err(|e| ProjectStoreError::Storage(e.to_string()))
        })
    }

    fn upsert(conn: &rusqlite::Connection, p: &Project) -> rusqlite::Result<()> {
        conn.execute(
            "INSERT INTO project_states
                (project_id, user_id, name, repo, is_active, active_run_id, running, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(project_id) DO UPDATE SET
                user_id = excluded.user_id,
                name = excluded.name,
                repo = excluded.repo,
                is_active = excluded.is_active,
                active_run_id = excluded.active_run_id,
                running = excluded.running,
                updated_at = excluded.updated_at",
            rusqlite::params![
                p.project_id,
                p.user_id,
                p.name,
                p.repo,
                p.is_active as i64,
                p.active_run_id,
                p.running as i64,
                p.created_at_ms,
                p.updated_at_ms,
            ],
        )?;
        Ok(())
    }
}

#[async_trait]
impl ProjectStore for SqliteProjectStore {
    async fn get_project(&self, project_id: &str) -> Result<Option<Project>, ProjectStoreError> {
        let db = self.db.clone();
        let project_id = project_id.to_string();
        tokio::task::block_in_place(move || {
            let conn = db.lock().map_err(|_| ProjectStoreError::Storage("lock".into()))?;
            conn.query_row(
                "SELECT project_id, user_id, name, repo, is_active, active_run_id, running, created_at, updated_at
                 FROM project_states WHERE project_id = ?1",
                rusqlite::params![project_id],
                row_to_project,
            )
            .optional()
            .map_err(|e| ProjectStoreError::Storage(e.to_string()))
        })
    }

    async fn put_project(&self, mut project: Project) -> Result<(), ProjectStoreError> {
        normalize(&mut project);
        let db = self.db.clone();
        tokio::task::block_in_place(move || {
            let conn = db.lock().map_err(|_| ProjectStoreError::Storage("lock".into()))?;
            Self::upsert(&conn, &project).map_err(|e| ProjectStoreError::Storage(e.to_string()))
        })
    }

    async fn update(
        &self,
        project_id: &str,
        mutator: ProjectMutator,
    ) -> Result<Project, ProjectStoreError> {
        let db = self.db.clone();
        let project_id = project_id.to_string();
        tokio::task::block_in_place(move || {
            let conn = db.lock().map_err(|_| ProjectStoreError::Storage("lock".into()))?;
            let mut project: Project = conn
                .query_row(
                    "SELECT project_id, user_id, name, repo, is_active, active_run_id, running, created_at, updated_at
                     FROM project_states WHERE project_id = ?1",
                    rusqlite::params![project_id],
                    row_to_project,
                )
                .optional()
                .map_err(|e| ProjectStoreError::Storage(e.to_string()))?
                .ok_or_else(|| ProjectStoreError::NotFound(project_id.clone()))?;
            mutator(&mut project);
            normalize(&mut project);
            project.updated_at_ms = now_ms();
            Self::upsert(&conn, &project).map_err(|e| ProjectStoreError::Storage(e.to_string()))?;
            Ok(project)
        })
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Project>, ProjectStoreError> {
        let db = self.db.clone();
        let user_id = user_id.to_string();
        tokio::task::block_in_place(move || {
            let conn = db.lock().map_err(|_| ProjectStoreError::Storage("lock".into()))?;
            let mut stmt = conn
                .prepare(
                    "SELECT project_id, user_id, name, repo, is_active, active_run_id, running, created_at, updated_at
                     FROM project_states WHERE user_id = ?1 ORDER BY created_at ASC",
                )
                .map_err(|e| ProjectStoreError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map(rusqlite::params![user_id], row_to_project)
                .map_err(|e| ProjectStoreError::Storage(e.to_string()))?;
            rows.collect::<Result<Vec<_>, _>>().map_err(|e| ProjectStoreError::Storage(e.to_string()))
        })
    }

    async fn get_active_by_user(&self, user_id: &str) -> Result<Option<Project>, ProjectStoreError> {
        let db = self.db.clone();
        let user_id = user_id.to_string();
        tokio::task::block_in_place(move || {
            let conn = db.lock().map_err(|_| ProjectStoreError::Storage("lock".into()))?;
            conn.query_row(
                "SELECT project_id, user_id, name, repo, is_active, active_run_id, running, created_at, updated_at
                 FROM project_states WHERE user_id = ?1 AND is_active = 1",
                rusqlite::params![user_id],
                row_to_project,
            )
            .optional()
            .map_err(|e| ProjectStoreError::Storage(e.to_string()))
        })
    }

    async fn set_active_for_user(
        &self,
        user_id: &str,
        project_id: &str,
    ) -> Result<(), ProjectStoreError> {
        let db = self.db.clone();
        let (user_id, project_id) = (user_id.to_string(), project_id.to_string());
        tokio::task::block_in_place(move || {
            let mut conn = db.lock().map_err(|_| ProjectStoreError::Storage("lock".into()))?;
            let tx = conn
                .transaction()
                .map_err(|e| ProjectStoreError::Storage(e.to_string()))?;
            let exists: Option<String> = tx
                .query_row(
                    "SELECT project_id FROM project_states WHERE project_id = ?1 AND user_id = ?2",
                    rusqlite::params![project_id, user_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| ProjectStoreError::Storage(e.to_string()))?;
            if exists.is_none() {
                return Err(ProjectStoreError::NotFound(project_id));
            }
            tx.execute(
                "UPDATE project_states SET is_active = 0, updated_at = ?1 WHERE user_id = ?2",
                rusqlite::params![now_ms(), user_id],
            )
            .map_err(|e| ProjectStoreError::Storage(e.to_string()))?;
            tx.execute(
                "UPDATE project_states SET is_active = 1, updated_at = ?1 WHERE project_id = ?2",
                rusqlite::params![now_ms(), project_id],
            )
            .map_err(|e| ProjectStoreError::Storage(e.to_string()))?;
            tx.commit().map_err(|e| ProjectStoreError::Storage(e.to_string()))
        })
    }
}
