//! Run Context Builder: assembles a per-project execution environment.
//!
//! Generalizes `agent/react/build/mod.rs`'s `build_react_run_context` (which
//! assembles checkpointer + store + runnable_config + tool_source from a
//! `ReactBuildConfig`) into [`build_run_context`], assembling: repo sandbox,
//! artifact sandbox, model registry, LLM dispatch client, MCP tool registry,
//! and a merged worker resolver — everything a [`crate::executor::WorkerExecutor`]
//! needs to drive one project's runs.
//!
//! The repository sandbox, LLM client, and tool registry are trait
//! boundaries only (real inference, wire protocols, and MCP transport are
//! external collaborators); this crate supplies lightweight default
//! implementations so the engine runs end-to-end without real backends
//! wired in.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use model_spec_core::{Level, ModelRegistry, Role};
use thiserror::Error;

use crate::run::WorkerOutput;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("repo sandbox: {0}")]
    RepoSandbox(String),
    #[error("artifact sandbox: {0}")]
    ArtifactSandbox(String),
    #[error("missing required worker key: {0}")]
    MissingWorker(String),
}

/// A filesystem view restricted to a resolved root. Reads (and for the
/// artifact sandbox, writes) outside the root are rejected.
#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
    writable: bool,
}

impl Sandbox {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn writable(&self) -> bool {
        self.writable
    }

    fn resolve(&self, rel: &Path) -> Result<PathBuf, String> {
        if rel.is_absolute() {
            return Err(format!("path {} must be relative", rel.display()));
        }
        let joined = self.root.join(rel);
        // Reject `..` escapes without requiring the path to exist (callers may
        // be about to create a file under the sandbox).
        let mut depth: i64 = 0;
        for comp in rel.components() {
            match comp {
                std::path::Component::ParentDir => depth -= 1,
                std::path::Component::Normal(_) => depth += 1,
                _ => {}
            }
            if depth < 0 {
                return Err(format!("path {} escapes sandbox root", rel.display()));
            }
        }
        Ok(joined)
    }

    pub fn read_to_string(&self, rel: &Path) -> Result<String, String> {
        let path = self.resolve(rel)?;
        std::fs::read_to_string(path).map_err(|e| e.to_string())
    }

    pub fn write(&self, rel: &Path, contents: &str) -> Result<(), String> {
        if !self.writable {
            return Err("sandbox is read-only".to_string());
        }
        let path = self.resolve(rel)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        std::fs::write(path, contents).map_err(|e| e.to_string())
    }
}

/// Input handed to a worker on each step: the user's latest input (empty on
/// the first call) plus the worker-specific state carried from the previous
/// step, if any.
#[derive(Debug, Clone, Default)]
pub struct WorkerInput {
    pub user_input: String,
    pub state: Option<serde_json::Value>,
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker failed: {0}")]
    Failed(String),
}

/// A resolvable unit of work registered by key in a project's resolver.
/// Produces a [`WorkerOutput`] for each step; the Worker Executor dispatches
/// on its tag rather than on type introspection.
#[async_trait]
pub trait Worker: Send + Sync {
    async fn step(&self, input: WorkerInput) -> Result<WorkerOutput, WorkerError>;
}

/// A worker that asks for input exactly once, then completes — used for
/// `bootstrap` and tests.
pub struct EchoWorker {
    pub prompt: String,
}

#[async_trait]
impl Worker for EchoWorker {
    async fn step(&self, input: WorkerInput) -> Result<WorkerOutput, WorkerError> {
        if input.state.is_none() {
            return Ok(WorkerOutput::NeedMoreInput {
                prompt: self.prompt.clone(),
                client_view: None,
            });
        }
        Ok(WorkerOutput::Done {
            client_view: Some(serde_json::json!({"echo": input.user_input})),
        })
    }
}

/// Deterministic demo worker bound to the `test-pipeline` key: streams a
/// fixed number of timed progress chunks with synthetic client-views, then
/// completes. No real LLM or tool call happens; it exists so a client can
/// exercise `StartRun`/`WatchRun` end-to-end without a repo or credentials.
pub struct TestPipelineWorker {
    pub steps: u32,
    pub step_delay: std::time::Duration,
}

impl Default for TestPipelineWorker {
    fn default() -> Self {
        Self {
            steps: 3,
            step_delay: std::time::Duration::from_millis(200),
        }
    }
}

#[async_trait]
impl Worker for TestPipelineWorker {
    async fn step(&self, input: WorkerInput) -> Result<WorkerOutput, WorkerError> {
        let done = input
            .state
            .as_ref()
            .and_then(|s| s.get("step"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32;

        if done >= self.steps {
            return Ok(WorkerOutput::Done {
                client_view: Some(serde_json::json!({
                    "kind": "test-pipeline",
                    "steps_completed": done,
                })),
            });
        }

        tokio::time::sleep(self.step_delay).await;
        let next = done + 1;
        Ok(WorkerOutput::Progress {
            message: Some(format!("test-pipeline step {next}/{}", self.steps)),
            progress_percent: Some((next * 100 / self.steps.max(1)) as u8),
            state: Some(serde_json::json!({"step": next})),
        })
    }
}

/// Merged worker registries (architecture, codebase, external, plan, test)
/// keyed by worker key, generalized from `StateGraph`'s single-graph node
/// registry to a multi-worker-key lookup.
#[derive(Default, Clone)]
pub struct WorkerResolver {
    workers: HashMap<String, Arc<dyn Worker>>,
}

impl WorkerResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, key: impl Into<String>, worker: Arc<dyn Worker>) {
        self.workers.insert(key.into(), worker);
    }

    pub fn resolve(&self, key: &str) -> Option<Arc<dyn Worker>> {
        self.workers.get(key).cloned()
    }

    pub fn has(&self, key: &str) -> bool {
        self.workers.contains_key(key)
    }

    /// Merges `other` into `self`; entries in `other` win on key collision,
    /// with later-registry-wins composition order.
    pub fn merge(&mut self, other: WorkerResolver) {
        self.workers.extend(other.workers);
    }
}

/// Dispatch-only LLM client boundary: real inference is out of scope
/// here. The model registry decides which model a `(role, level)`
/// call would use; this trait is where a real client would plug in.
#[async_trait]
pub trait LlmDispatchClient: Send + Sync {
    async fn dispatch(&self, role: Role, level: Level, prompt: &str) -> Result<String, String>;
}

/// Deterministic fake client used when no real provider is configured.
pub struct FakeLlmClient {
    registry: ModelRegistry,
}

#[async_trait]
impl LlmDispatchClient for FakeLlmClient {
    async fn dispatch(&self, role: Role, level: Level, prompt: &str) -> Result<String, String> {
        let model = self.registry.dispatch(role, level);
        Ok(format!(
            "[{}/{}] {}",
            model.provider_id, model.model_id, prompt
        ))
    }
}

/// MCP tool registry boundary (the MCP wire protocol itself is an
/// external collaborator). Default registry has no tools bound; a real
/// implementation would register sandbox-bound tools here.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    names: Vec<String>,
}

impl ToolRegistry {
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// Per-project execution environment: everything a run needs to execute a
/// worker end-to-end, owned exclusively by its project.
pub struct RunContext {
    pub id: String,
    pub repo_name: String,
    pub out_dir: PathBuf,
    pub repo_sandbox: Sandbox,
    pub artifact_sandbox: Sandbox,
    pub model_registry: ModelRegistry,
    pub llm_client: Arc<dyn LlmDispatchClient>,
    pub tool_registry: ToolRegistry,
    pub resolver: WorkerResolver,
    cleanup: Option<Box<dyn FnOnce() + Send>>,
}

impl RunContext {
    /// Closes the LLM client and releases any resources held by the context.
    /// Consumes `self` so it can only run once.
    pub fn cleanup(mut self) {
        if let Some(f) = self.cleanup.take() {
            f();
        }
    }

    /// Worker keys the Project Registry treats as "must resolve" before
    /// reusing a cached context when one is already resolvable.
    pub fn has_required_workers(&self, required: &[&str]) -> bool {
        required.iter().all(|k| self.resolver.has(k))
    }

    /// True if every worker key this engine requires still resolves. The
    /// Project Registry's `EnsureRunContext` calls this to decide whether a
    /// cached context can be reused as-is.
    pub fn is_ready(&self) -> bool {
        self.has_required_workers(REQUIRED_WORKER_KEYS)
    }
}

/// Configuration the builder needs: which project/repo to root sandboxes
/// under, and where `REPOS_ROOT` resolves to.
pub struct RunContextConfig<'a> {
    pub project_id: &'a str,
    pub repo: &'a str,
    pub repos_root: Option<&'a Path>,
    pub artifacts_root: &'a Path,
}

const REQUIRED_WORKER_KEYS: &[&str] = &["bootstrap", "testllmChar"];

/// Builds a [`RunContext`] for one project. If `repo` is empty, the repo
/// sandbox roots at the repos directory itself ("bootstrap" environment);
/// otherwise it resolves `repos_root.join(repo)` and restricts reads to that
/// subtree.
pub fn build_run_context(config: RunContextConfig<'_>) -> Result<RunContext, BuildError> {
    let repos_root = config
        .repos_root
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("repos"));

    let repo_root = if config.repo.is_empty() {
        repos_root.clone()
    } else {
        repos_root.join(config.repo)
    };
    let repo_sandbox = Sandbox {
        root: repo_root,
        writable: false,
    };

    let out_dir = config
        .artifacts_root
        .join(if config.repo.is_empty() {
            "bootstrap"
        } else {
            config.repo
        })
        .join(config.project_id);
    std::fs::create_dir_all(&out_dir).map_err(|e| BuildError::ArtifactSandbox(e.to_string()))?;
    let artifact_sandbox = Sandbox {
        root: out_dir.clone(),
        writable: true,
    };

    let model_registry = ModelRegistry::from_env();
    let llm_client: Arc<dyn LlmDispatchClient> = Arc::new(FakeLlmClient {
        registry: model_registry.clone(),
    });

    let mut resolver = WorkerResolver::new();
    resolver.register(
        "bootstrap",
        Arc::new(EchoWorker {
            prompt: "What would you like to analyze?".to_string(),
        }),
    );
    resolver.register(
        "testllmChar",
        Arc::new(EchoWorker {
            prompt: "test-pipeline input".to_string(),
        }),
    );
    resolver.register("test-pipeline", Arc::<TestPipelineWorker>::default());

    for key in REQUIRED_WORKER_KEYS {
        if !resolver.has(key) {
            return Err(BuildError::MissingWorker((*key).to_string()));
        }
    }

    Ok(RunContext {
        id: config.project_id.to_string(),
        repo_name: config.repo.to_string(),
        out_dir,
        repo_sandbox,
        artifact_sandbox,
        model_registry,
        llm_client,
        tool_registry: ToolRegistry::default(),
        resolver,
        cleanup: Some(Box::new(|| {
            tracing::debug!("run context: llm client closed");
        })),
    })
}

/// Thin wrapper the Project Registry calls to lazily (re)build a context.
pub struct RunContextBuilder;

impl RunContextBuilder {
    pub fn build(config: RunContextConfig<'_>) -> Result<RunContext, BuildError> {
        build_run_context(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_repo_roots_at_repos_dir() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = build_run_context(RunContextConfig {
            project_id: "p1",
            repo: "",
            repos_root: Some(dir.path()),
            artifacts_root: dir.path(),
        })
        .unwrap();
        assert_eq!(ctx.repo_sandbox.root(), dir.path());
        assert!(ctx.has_required_workers(REQUIRED_WORKER_KEYS));
        ctx.cleanup();
    }

    #[test]
    fn non_bootstrap_repo_resolves_under_repos_root() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = build_run_context(RunContextConfig {
            project_id: "p1",
            repo: "my-repo",
            repos_root: Some(dir.path()),
            artifacts_root: dir.path(),
        })
        .unwrap();
        assert_eq!(ctx.repo_sandbox.root(), dir.path().join("my-repo"));
    }

    #[test]
    fn artifact_sandbox_rejects_path_escape() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = build_run_context(RunContextConfig {
            project_id: "p1",
            repo: "r",
            repos_root: Some(dir.path()),
            artifacts_root: dir.path(),
        })
        .unwrap();
        let escape = Path::new("../../etc/passwd");
        assert!(ctx.artifact_sandbox.write(escape, "x").is_err());
    }

    #[test]
    fn artifact_sandbox_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = build_run_context(RunContextConfig {
            project_id: "p1",
            repo: "r",
            repos_root: Some(dir.path()),
            artifacts_root: dir.path(),
        })
        .unwrap();
        ctx.artifact_sandbox
            .write(Path::new("out.json"), "{}")
            .unwrap();
        let back = ctx.artifact_sandbox.read_to_string(Path::new("out.json")).unwrap();
        assert_eq!(back, "{}");
    }

    #[tokio::test]
    async fn llm_client_dispatches_through_model_registry() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = build_run_context(RunContextConfig {
            project_id: "p1",
            repo: "",
            repos_root: Some(dir.path()),
            artifacts_root: dir.path(),
        })
        .unwrap();
        let out = ctx
            .llm_client
            .dispatch(Role::Codebase, Level::Fast, "hello")
            .await
            .unwrap();
        assert!(out.contains("fake/codebase-fast"));
    }

    #[test]
    fn test_pipeline_worker_is_registered() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = build_run_context(RunContextConfig {
            project_id: "p1",
            repo: "",
            repos_root: Some(dir.path()),
            artifacts_root: dir.path(),
        })
        .unwrap();
        assert!(ctx.resolver.has("test-pipeline"));
    }

    #[tokio::test]
    async fn test_pipeline_worker_streams_progress_then_completes() {
        let worker = TestPipelineWorker {
            steps: 2,
            step_delay: std::time::Duration::from_millis(1),
        };
        let mut input = WorkerInput::default();

        let first = worker.step(input.clone()).await.unwrap();
        let state = match first {
            WorkerOutput::Progress {
                progress_percent,
                state,
                ..
            } => {
                assert_eq!(progress_percent, Some(50));
                state
            }
            other => panic!("expected Progress, got {other:?}"),
        };
        input.state = state;

        let second = worker.step(input.clone()).await.unwrap();
        let state = match second {
            WorkerOutput::Progress {
                progress_percent,
                state,
                ..
            } => {
                assert_eq!(progress_percent, Some(100));
                state
            }
            other => panic!("expected Progress, got {other:?}"),
        };
        input.state = state;

        let third = worker.step(input).await.unwrap();
        assert!(matches!(third, WorkerOutput::Done { .. }));
    }
}
