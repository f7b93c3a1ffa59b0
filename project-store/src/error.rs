#[derive(Debug, thiserror::Error)]
pub enum ProjectStoreError {
    #[error("storage: {0}")]
    Storage(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("run context: {0}")]
    RunContext(String),
}
