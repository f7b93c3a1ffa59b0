//! The persisted project record and its shared normalization rule.

use serde::{Deserialize, Serialize};

/// One project: a repo (or empty, for the bootstrap flow) plus the run
/// state the Project Registry tracks for it. Field order is fixed so both
/// backends serialize it identically (stable field order).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub project_id: String,
    pub user_id: String,
    pub name: String,
    pub repo: String,
    pub is_active: bool,
    pub active_run_id: Option<String>,
    pub running: bool,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl Project {
    pub fn new(project_id: impl Into<String>, user_id: impl Into<String>, now_ms: i64) -> Self {
        let mut p = Self {
            project_id: project_id.into(),
            user_id: user_id.into(),
            name: String::new(),
            repo: String::new(),
            is_active: false,
            active_run_id: None,
            running: false,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        };
        normalize(&mut p);
        p
    }
}

/// Shared normalization rule applied by both backends before a record is
/// considered stored: trim whitespace in `name`/`repo`,
/// default an empty name to `"Project"`, and force `running=false` whenever
/// `active_run_id` is empty.
pub fn normalize(project: &mut Project) {
    project.name = project.name.trim().to_string();
    if project.name.is_empty() {
        project.name = "Project".to_string();
    }
    project.repo = project.repo.trim().to_string();

    if project
        .active_run_id
        .as_deref()
        .map(str::trim)
        .unwrap_or("")
        .is_empty()
    {
        project.active_run_id = None;
        project.running = false;
    }
}
