//! Shared model/provider spec types and the role×level dispatch registry used
//! by the Run Context Builder to pick a model for each worker's LLM calls.

pub mod composite;
pub mod config_override;
pub mod registry;
pub mod resolver;
pub mod spec;

pub use composite::CompositeResolver;
pub use config_override::ConfigOverride;
pub use registry::{Level, ModelId, ModelRegistry, Role};
pub use resolver::ModelLimitResolver;
pub use spec::ModelSpec;
