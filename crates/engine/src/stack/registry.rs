//! Named registry of stacks, used to resolve `"stack.step"` references.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use tracing::debug;

use super::{Stack, StackDefinition};
use crate::error::{ReferenceError, StackError};
use crate::provider::ValueProvider;
use crate::step::WrappedStep;

type Stacks = RwLock<IndexMap<String, Stack>>;

static GLOBAL: Lazy<StackRegistry> = Lazy::new(StackRegistry::new);

/// Thread-safe registry of stacks keyed by name, in registration order.
///
/// Clones share the same entries. Stacks keep only a weak handle back to the
/// registry they were created against.
#[derive(Clone, Default)]
pub struct StackRegistry {
    stacks: Arc<Stacks>,
}

impl StackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lazily created process-wide registry.
    pub fn global() -> &'static StackRegistry {
        &GLOBAL
    }

    /// Creates a stack from `definition` against this registry.
    pub fn create(&self, provider: Arc<dyn ValueProvider>, definition: StackDefinition) -> Result<Stack, StackError> {
        Stack::create(self, provider, definition)
    }

    /// Registers `stack` under its name, returning the entry it replaced.
    pub fn register(&self, stack: Stack) -> Option<Stack> {
        let name = stack.name();
        let previous = self.write().insert(name.clone(), stack);
        if previous.is_some() {
            debug!(stack = %name, "replaced registered stack");
        } else {
            debug!(stack = %name, "registered stack");
        }
        previous
    }

    pub fn lookup(&self, name: &str) -> Option<Stack> {
        self.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn remove(&self, name: &str) -> Option<Stack> {
        self.write().shift_remove(name)
    }

    /// Drops every registered stack.
    pub fn purge(&self) {
        self.write().clear();
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Resolves a `"stack.step"` reference to the referenced stack's own
    /// wrapped step.
    pub fn resolve_reference(&self, reference: &str) -> Result<WrappedStep, ReferenceError> {
        let (stack_name, step_name) = split_reference(reference)?;
        let stack = self.lookup(stack_name).ok_or_else(|| ReferenceError::UnknownStack {
            stack: stack_name.to_string(),
            reference: reference.to_string(),
        })?;
        stack.step(step_name).ok_or_else(|| ReferenceError::UnknownStep {
            stack: stack_name.to_string(),
            step: step_name.to_string(),
            reference: reference.to_string(),
        })
    }

    pub(crate) fn downgrade(&self) -> WeakRegistry {
        WeakRegistry(Arc::downgrade(&self.stacks))
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexMap<String, Stack>> {
        self.stacks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexMap<String, Stack>> {
        self.stacks.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for StackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackRegistry").field("stacks", &self.names()).finish()
    }
}

/// Non-owning handle a stack keeps to the registry it belongs to.
#[derive(Clone, Default)]
pub(crate) struct WeakRegistry(Weak<Stacks>);

impl WeakRegistry {
    pub(crate) fn upgrade(&self) -> Option<StackRegistry> {
        self.0.upgrade().map(|stacks| StackRegistry { stacks })
    }
}

/// Splits `"stack.step"` at the first dot.
pub(crate) fn split_reference(reference: &str) -> Result<(&str, &str), ReferenceError> {
    match reference.split_once('.') {
        Some((stack, step)) if !stack.is_empty() && !step.is_empty() => Ok((stack, step)),
        _ => Err(ReferenceError::Malformed {
            reference: reference.to_string(),
        }),
    }
}
