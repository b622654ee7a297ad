//! Model registry.
//!
//! Maps a model identifier to a factory. Only the factory for the configured
//! identifier is ever called, so unused backends are never constructed.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{IdentityRanker, LexicalRanker, RankError, Ranker, ReverseRanker};
use crate::config::ModelConfig;

/// Builds a model from its configuration.
pub type ModelFactory = fn(&ModelConfig) -> Result<Arc<dyn Ranker>, RankError>;

/// Identifier → factory table.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    factories: BTreeMap<String, ModelFactory>,
}

impl ModelRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the models shipped in this crate.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("identity", |_| Ok(Arc::new(IdentityRanker)));
        registry.register("reverse", |_| Ok(Arc::new(ReverseRanker)));
        registry.register("lexical", |_| Ok(Arc::new(LexicalRanker)));
        registry
    }

    /// Add or replace a factory.
    pub fn register(&mut self, name: impl Into<String>, factory: ModelFactory) {
        self.factories.insert(name.into(), factory);
    }

    /// Registered identifiers, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Construct the model selected by `config`.
    pub fn create(&self, config: &ModelConfig) -> Result<Arc<dyn Ranker>, RankError> {
        let factory = self
            .factories
            .get(config.name.as_str())
            .ok_or_else(|| RankError::UnknownModel(config.name.clone()))?;
        let model = factory(config)?;
        tracing::info!(model = %config.name, "Ranking model loaded");
        Ok(model)
    }
}
