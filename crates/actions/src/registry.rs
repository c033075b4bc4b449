//! Maps action types to their handlers.

use std::collections::HashMap;
use std::sync::Arc;

use followup_core::ActionType;

use crate::traits::ActionHandler;

/// Handler lookup table supplied by the hosting application.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<ActionType, Arc<dyn ActionHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the handler for one action type.
    pub fn register(&mut self, action_type: ActionType, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(action_type, handler);
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, action_type: ActionType, handler: Arc<dyn ActionHandler>) -> Self {
        self.register(action_type, handler);
        self
    }

    /// Use one handler for every action type.
    pub fn with_fallback(handler: Arc<dyn ActionHandler>) -> Self {
        let mut registry = Self::new();
        for action_type in ActionType::ALL {
            registry.register(action_type, Arc::clone(&handler));
        }
        registry
    }

    pub fn get(&self, action_type: ActionType) -> Option<&Arc<dyn ActionHandler>> {
        self.handlers.get(&action_type)
    }

    /// Drop the handler for a type; later dispatches fail as unknown.
    pub fn unregister(&mut self, action_type: ActionType) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.remove(&action_type)
    }

    /// Registered types, sorted.
    pub fn types(&self) -> Vec<ActionType> {
        let mut types: Vec<ActionType> = self.handlers.keys().copied().collect();
        types.sort();
        types
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<(ActionType, &str)> = self
            .types()
            .into_iter()
            .filter_map(|t| self.handlers.get(&t).map(|h| (t, h.name())))
            .collect();
        f.debug_struct("HandlerRegistry").field("handlers", &names).finish()
    }
}
