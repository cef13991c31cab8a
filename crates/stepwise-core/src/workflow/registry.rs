//! Step-kind registry.
//!
//! Maps each `StepKind` to the handler that performs it. The registry is a
//! plain value handed to `WorkflowDefinition::from_spec` (and held by the
//! router), so separate engines can run with separate handler sets.

use std::collections::HashMap;

use stepwise_types::workflow::StepKind;

use super::step::BoxStepHandler;

/// Handlers keyed by step kind.
#[derive(Debug, Clone, Default)]
pub struct StepRegistry {
    handlers: HashMap<StepKind, BoxStepHandler>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, returning the one it replaced.
    pub fn register(&mut self, kind: StepKind, handler: BoxStepHandler) -> Option<BoxStepHandler> {
        self.handlers.insert(kind, handler)
    }

    /// Builder-style `register`.
    pub fn with(mut self, kind: StepKind, handler: BoxStepHandler) -> Self {
        self.register(kind, handler);
        self
    }

    pub fn get(&self, kind: StepKind) -> Option<&BoxStepHandler> {
        self.handlers.get(&kind)
    }

    pub fn contains(&self, kind: StepKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Registered kinds, in no particular order.
    pub fn kinds(&self) -> impl Iterator<Item = StepKind> + '_ {
        self.handlers.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::step::{StepContext, StepOutput, fn_step};
    use serde_json::Value;

    fn noop() -> BoxStepHandler {
        fn_step(|_ctx: StepContext| async { Ok(StepOutput::new(Value::Null)) })
    }

    #[test]
    fn register_and_lookup() {
        let registry = StepRegistry::new().with(StepKind::Compute, noop());
        assert!(registry.contains(StepKind::Compute));
        assert!(registry.get(StepKind::Agent).is_none());
        assert_eq!(registry.kinds().collect::<Vec<_>>(), vec![StepKind::Compute]);
    }

    #[test]
    fn register_replaces_existing_handler() {
        let mut registry = StepRegistry::new();
        assert!(registry.register(StepKind::Tool, noop()).is_none());
        assert!(registry.register(StepKind::Tool, noop()).is_some());
    }

    #[test]
    fn registries_are_independent() {
        let a = StepRegistry::new().with(StepKind::Agent, noop());
        let b = StepRegistry::new();
        assert!(a.contains(StepKind::Agent));
        assert!(!b.contains(StepKind::Agent));
    }
}
