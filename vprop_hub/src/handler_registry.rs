//! Handler registry.
//!
//! Maps handler names to factories. The hub receives the created handlers
//! by value; the order of `create_handlers()` is the priority order.

use crate::handlers;
use std::collections::HashMap;
use vprop_common::vhal::error::VhalError;
use vprop_common::vhal::handler::{HandlerFactory, PropertyHandler};

/// Registry of available domain handlers.
pub struct HandlerRegistry {
    factories: HashMap<&'static str, HandlerFactory>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry holding every built-in domain handler.
    pub fn with_builtin_handlers() -> Self {
        let mut registry = Self::new();
        for (name, factory) in handlers::BUILTIN_HANDLERS {
            registry.register(name, *factory);
        }
        registry
    }

    /// Register a handler factory.
    ///
    /// # Panics
    /// Panics if a handler with the same name is already registered.
    pub fn register(&mut self, name: &'static str, factory: HandlerFactory) {
        if self.factories.contains_key(name) {
            panic!("Handler '{name}' is already registered");
        }
        self.factories.insert(name, factory);
    }

    pub fn get_factory(&self, name: &str) -> Option<HandlerFactory> {
        self.factories.get(name).copied()
    }

    /// Create one handler by name.
    ///
    /// # Errors
    /// Returns `VhalError::ConfigError` if no handler with that name is registered.
    pub fn create_handler(&self, name: &str) -> Result<Box<dyn PropertyHandler>, VhalError> {
        let factory = self
            .get_factory(name)
            .ok_or_else(|| VhalError::ConfigError(format!("unknown handler '{name}'")))?;
        Ok(factory())
    }

    /// Create handlers in the order given by `names`.
    pub fn create_handlers<S: AsRef<str>>(
        &self,
        names: &[S],
    ) -> Result<Vec<Box<dyn PropertyHandler>>, VhalError> {
        names.iter().map(|n| self.create_handler(n.as_ref())).collect()
    }

    /// All registered handler names, sorted.
    pub fn list_handlers(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
