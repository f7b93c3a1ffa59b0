//! Role × level model dispatch for the Run Context Builder.
//!
//! A [`ModelRegistry`] answers "which model should back this worker's LLM
//! calls" for a given `(role, level)` pair. It always has a default (the
//! `FakeModelRegistry` tier, usable with no credentials at all) and may layer
//! real provider tiers on top when `GEMINI_API_KEY` / `GROQ_API_KEY` are
//! present.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The worker-registry family a model is dispatched for (the merged
/// "architecture, codebase, external, plan, test" worker registries).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Architecture,
    Codebase,
    External,
    Plan,
    Test,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Architecture,
        Role::Codebase,
        Role::External,
        Role::Plan,
        Role::Test,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Architecture => "architecture",
            Role::Codebase => "codebase",
            Role::External => "external",
            Role::Plan => "plan",
            Role::Test => "test",
        }
    }
}

/// Capability tier within a role: how much the worker is willing to spend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Fast,
    Standard,
    Deep,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::Fast, Level::Standard, Level::Deep];

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Fast => "fast",
            Level::Standard => "standard",
            Level::Deep => "deep",
        }
    }
}

/// A dispatchable model identity: the provider to route through plus the
/// provider-specific model id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelId {
    pub provider_id: String,
    pub model_id: String,
}

impl ModelId {
    pub fn new(provider_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            model_id: model_id.into(),
        }
    }

    fn fake(role: Role, level: Level) -> Self {
        Self::new("fake", format!("{}-{}", role.as_str(), level.as_str()))
    }
}

/// Maps `(role, level)` to a dispatchable model. Built once per [`crate`]
/// consumer (the Run Context Builder holds one per project) and consulted by
/// the LLM dispatch client on every call.
///
/// Always has a full fake default for every `(role, level)` pair (so a
/// project with no provider credentials still runs end-to-end against
/// deterministic fakes); [`ModelRegistry::from_env`] additionally overrides
/// defaults with real provider tiers when credentials are present.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    overrides: HashMap<(Role, Level), ModelId>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::fake()
    }
}

impl ModelRegistry {
    /// A registry backed entirely by fake models, one per `(role, level)`.
    pub fn fake() -> Self {
        Self {
            overrides: HashMap::new(),
        }
    }

    /// Overrides the model dispatched for every `(role, level)` pair with a
    /// single provider tier (used by [`Self::register_gemini`]/[`Self::register_groq`]
    /// to set a uniform default, which callers may still narrow per-role later).
    pub fn set_default_for_all(&mut self, model: ModelId) {
        for role in Role::ALL {
            for level in Level::ALL {
                self.overrides.insert((role, level), model.clone());
            }
        }
    }

    pub fn set(&mut self, role: Role, level: Level, model: ModelId) {
        self.overrides.insert((role, level), model);
    }

    /// Resolves the model to dispatch for `(role, level)`, falling back to the
    /// deterministic fake model id if nothing was registered.
    pub fn dispatch(&self, role: Role, level: Level) -> ModelId {
        self.overrides
            .get(&(role, level))
            .cloned()
            .unwrap_or_else(|| ModelId::fake(role, level))
    }

    /// Registers Gemini as the default provider across all roles/levels, at
    /// the given tier (`GEMINI_TIER`, default `"free"`). Only called when
    /// `GEMINI_API_KEY` is present.
    pub fn register_gemini(&mut self, tier: &str) {
        self.set_default_for_all(ModelId::new("gemini", format!("gemini-{tier}")));
    }

    /// Registers Groq as the default provider across all roles/levels, at the
    /// given tier (`GROQ_TIER`, default `"free"`). Only called when
    /// `GROQ_API_KEY` is present.
    pub fn register_groq(&mut self, tier: &str) {
        self.set_default_for_all(ModelId::new("groq", format!("groq-{tier}")));
    }

    /// Builds a registry from process environment: fake defaults, optionally
    /// overridden by Gemini then Groq tiers if their API keys are set (Gemini
    /// takes priority when both are present, mirroring the Run Context
    /// Builder's documented provider precedence).
    pub fn from_env() -> Self {
        let mut registry = Self::fake();
        if std::env::var("GEMINI_API_KEY").is_ok() {
            let tier = std::env::var("GEMINI_TIER").unwrap_or_else(|_| "free".to_string());
            registry.register_gemini(&tier);
        } else if std::env::var("GROQ_API_KEY").is_ok() {
            let tier = std::env::var("GROQ_TIER").unwrap_or_else(|_| "free".to_string());
            registry.register_groq(&tier);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_default_dispatches_deterministic_ids() {
        let registry = ModelRegistry::fake();
        let m = registry.dispatch(Role::Codebase, Level::Fast);
        assert_eq!(m, ModelId::new("fake", "codebase-fast"));
    }

    #[test]
    fn gemini_override_applies_to_every_role_and_level() {
        let mut registry = ModelRegistry::fake();
        registry.register_gemini("pro");
        for role in Role::ALL {
            for level in Level::ALL {
                assert_eq!(
                    registry.dispatch(role, level),
                    ModelId::new("gemini", "gemini-pro")
                );
            }
        }
    }

    #[test]
    fn per_role_override_wins_over_blanket_default() {
        let mut registry = ModelRegistry::fake();
        registry.register_gemini("free");
        registry.set(Role::Test, Level::Deep, ModelId::new("groq", "groq-dev"));
        assert_eq!(
            registry.dispatch(Role::Test, Level::Deep),
            ModelId::new("groq", "groq-dev")
        );
        assert_eq!(
            registry.dispatch(Role::Test, Level::Fast),
            ModelId::new("gemini", "gemini-free")
        );
    }
}
