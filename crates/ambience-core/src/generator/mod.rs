//! Generators and the registry that resolves catalog ids to them.

mod lightning;
mod pattern;
mod tornado;

use std::collections::HashMap;
use std::sync::Arc;

use crate::catalog::CatalogKind;
use crate::error::{EngineError, Result};
use crate::instance::SpawnContext;
use crate::scheduler::TimerTag;
use crate::surface::Element;

pub use lightning::Lightning;
pub use pattern::{Motion, Pattern, PatternGenerator, Secondary, BACKGROUND_PATTERNS, EFFECT_PATTERNS};
pub use tornado::Tornado;

/// Instantiates one visual behavior inside a freshly mounted layer.
///
/// Every timer must be armed through the context so the owning instance can
/// cancel it on teardown.
pub trait Generator: Send + Sync {
    fn instantiate(&self, ctx: &mut SpawnContext<'_>) -> Result<Box<dyn Behavior>>;
}

impl<F> Generator for F
where
    F: Fn(&mut SpawnContext<'_>) -> Result<Box<dyn Behavior>> + Send + Sync,
{
    fn instantiate(&self, ctx: &mut SpawnContext<'_>) -> Result<Box<dyn Behavior>> {
        self(ctx)
    }
}

/// Per-instance state reacting to the instance's own timers.
pub trait Behavior: Send {
    fn on_timer(&mut self, tag: TimerTag, ctx: &mut SpawnContext<'_>);

    /// Called after an element reached the end of its lifetime and left the layer.
    fn on_expire(&mut self, _element: Element, _ctx: &mut SpawnContext<'_>) {}
}

#[derive(Default, Clone)]
pub struct GeneratorRegistry {
    generators: HashMap<(CatalogKind, String), Arc<dyn Generator>>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in effect and background.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for (id, pattern) in EFFECT_PATTERNS {
            registry.register(CatalogKind::Effects, *id, PatternGenerator::new(*pattern));
        }
        for (id, pattern) in BACKGROUND_PATTERNS {
            registry.register(CatalogKind::Backgrounds, *id, PatternGenerator::new(*pattern));
        }
        registry.register(CatalogKind::Effects, "lightning", Lightning::new());
        registry.register(CatalogKind::Effects, "storm", Lightning::with_rain());
        registry.register(CatalogKind::Effects, "tornado", Tornado);
        registry
    }

    /// Replaces any generator already registered under the same key.
    pub fn register(
        &mut self,
        catalog: CatalogKind,
        id: impl Into<String>,
        generator: impl Generator + 'static,
    ) {
        self.generators
            .insert((catalog, id.into()), Arc::new(generator));
    }

    pub fn lookup(&self, catalog: CatalogKind, id: &str) -> Result<Arc<dyn Generator>> {
        self.generators
            .get(&(catalog, id.to_string()))
            .cloned()
            .ok_or_else(|| EngineError::UnknownEffect {
                catalog,
                id: id.to_string(),
            })
    }

    pub fn contains(&self, catalog: CatalogKind, id: &str) -> bool {
        self.generators.contains_key(&(catalog, id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.generators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;

    #[test]
    fn every_builtin_catalog_entry_has_a_generator() {
        let registry = GeneratorRegistry::builtin();
        for kind in CatalogKind::ALL {
            for entry in Catalog::builtin(kind).entries() {
                assert!(
                    registry.contains(kind, &entry.id),
                    "missing generator for {kind} {}",
                    entry.id
                );
            }
        }
    }

    #[test]
    fn lookup_is_scoped_by_catalog() {
        let registry = GeneratorRegistry::builtin();
        assert!(registry.lookup(CatalogKind::Backgrounds, "aurora").is_ok());
        assert!(matches!(
            registry.lookup(CatalogKind::Backgrounds, "rain"),
            Err(EngineError::UnknownEffect { .. })
        ));
        assert!(matches!(
            registry.lookup(CatalogKind::Effects, "volcano"),
            Err(EngineError::UnknownEffect { catalog: CatalogKind::Effects, .. })
        ));
    }
}
