//! `HandlerRegistry` maps a job's `handler_type` to the executable that runs
//! it, exposing `get(jobType) -> Option<Handler>`.
//!
//! Annotation-driven handler discovery maps to an explicit registration
//! interface instead: each handler is registered as `(name, executable)`
//! during startup; discovery from plugins becomes an explicit
//! `HandlerProvider` with a `register_handlers(registry)` hook. There is no
//! reflection-based scanning here — every handler, built-in or
//! plugin-sourced, is registered explicitly before the first scheduler
//! instance starts.

use std::collections::HashMap;
use std::sync::Arc;

use crate::traits::ExecutableNode;

/// Maps a job's `handler_type` (§3) to the executable that runs it.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn ExecutableNode>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under `name`, overwriting any previous
    /// registration — last writer wins, plain `HashMap::insert` semantics
    /// rather than erroring on redefinition.
    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn ExecutableNode>) {
        self.handlers.insert(name.into(), handler);
    }

    /// Apply every `HandlerProvider`'s registrations, in order.
    pub fn register_all(&mut self, providers: &[Arc<dyn HandlerProvider>]) {
        for provider in providers {
            provider.register_handlers(self);
        }
    }

    /// `None` means `handler_not_found` (§7) — the caller fails the JobRun
    /// permanently, no retry.
    pub fn get(&self, handler_type: &str) -> Option<Arc<dyn ExecutableNode>> {
        self.handlers.get(handler_type).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// A source of handlers registered at startup (built-in module, or a plugin
/// loader living outside this crate's scope — §1 "plugin loading of user
/// handlers" is an external collaborator; this trait is the seam it plugs
/// into).
pub trait HandlerProvider: Send + Sync {
    fn register_handlers(&self, registry: &mut HandlerRegistry);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockNode;

    #[test]
    fn last_registration_wins() {
        let mut registry = HandlerRegistry::new();
        registry.register("noop", Arc::new(MockNode::succeeding("first")));
        registry.register("noop", Arc::new(MockNode::succeeding("second")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unknown_handler_type_is_none() {
        let registry = HandlerRegistry::new();
        assert!(registry.get("does-not-exist").is_none());
    }
}
