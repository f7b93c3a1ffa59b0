//! Config override resolver: returns a fixed spec when an explicit limit is configured.

use async_trait::async_trait;

use crate::resolver::ModelLimitResolver;
use crate::spec::ModelSpec;

/// Resolver that returns a fixed spec based on explicit config.
///
/// Used as the highest-priority source in [`crate::composite::CompositeResolver`]
/// when a project or environment pins a context/output limit explicitly.
pub struct ConfigOverride {
    context_limit: u32,
    output_limit: Option<u32>,
}

impl ConfigOverride {
    /// Create with required context_limit. output_limit defaults to 64_000 if not set.
    pub fn new(context_limit: u32) -> Self {
        Self {
            context_limit,
            output_limit: None,
        }
    }

    /// Set output limit.
    pub fn with_output_limit(mut self, output_limit: u32) -> Self {
        self.output_limit = Some(output_limit);
        self
    }
}

#[async_trait]
impl ModelLimitResolver for ConfigOverride {
    async fn resolve(&self, _provider_id: &str, _model_id: &str) -> Option<ModelSpec> {
        Some(ModelSpec::new(
            self.context_limit,
            self.output_limit.unwrap_or(64_000),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn defaults_output_limit_when_unset() {
        let spec = ConfigOverride::new(128_000).resolve("any", "any").await.unwrap();
        assert_eq!(spec.context_limit, 128_000);
        assert_eq!(spec.output_limit, 64_000);
    }

    #[tokio::test]
    async fn honors_explicit_output_limit() {
        let spec = ConfigOverride::new(128_000)
            .with_output_limit(8_000)
            .resolve("any", "any")
            .await
            .unwrap();
        assert_eq!(spec.output_limit, 8_000);
    }

    #[tokio::test]
    async fn ignores_provider_and_model_id() {
        let r = ConfigOverride::new(1_000);
        let a = r.resolve("gemini", "pro").await.unwrap();
        let b = r.resolve("groq", "llama").await.unwrap();
        assert_eq!(a, b);
    }
}
