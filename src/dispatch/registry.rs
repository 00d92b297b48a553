//! Static registry of dispatchers keyed by target name.

use std::collections::HashMap;
use std::sync::Arc;

use super::Dispatcher;

/// Mapping from target name to the dispatcher that serves it.
///
/// Built once at startup; targets not registered here are rejected when
/// content is enqueued.
#[derive(Clone, Default)]
pub struct DispatchRegistry {
    dispatchers: HashMap<String, Arc<dyn Dispatcher>>,
}

impl DispatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a dispatcher for a target, replacing any previous one.
    pub fn register(&mut self, target: impl Into<String>, dispatcher: Arc<dyn Dispatcher>) {
        let target = target.into();
        tracing::debug!(target_name = %target, kind = dispatcher.kind(), "Registered dispatcher");
        self.dispatchers.insert(target, dispatcher);
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, target: impl Into<String>, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.register(target, dispatcher);
        self
    }

    pub fn get(&self, target: &str) -> Option<Arc<dyn Dispatcher>> {
        self.dispatchers.get(target).cloned()
    }

    pub fn contains(&self, target: &str) -> bool {
        self.dispatchers.contains_key(target)
    }

    /// Registered target names, sorted.
    pub fn targets(&self) -> Vec<String> {
        let mut names: Vec<String> = self.dispatchers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.dispatchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dispatchers.is_empty()
    }
}

impl std::fmt::Debug for DispatchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchRegistry")
            .field("targets", &self.targets())
            .finish()
    }
}
