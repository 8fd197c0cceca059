//! Declarative stack definitions.

use serde_json::Value;

use crate::step::{BranchOption, StepFn, WrappedStep};

/// Anything that can be placed into a stack.
#[derive(Debug, Clone)]
pub enum StepSpec {
    /// A step function, wrapped when added.
    Function(StepFn),
    /// An already canonical step, added as is.
    Wrapped(WrappedStep),
    /// Ordered conditional options forming a branch step.
    Branch(Vec<BranchOption>),
    /// A `"stack.step"` reference, only valid inside a definition.
    Reference(String),
    /// Plain data. Always rejected as an invalid step.
    Value(Value),
}

impl From<StepFn> for StepSpec {
    fn from(step: StepFn) -> Self {
        StepSpec::Function(step)
    }
}

impl From<WrappedStep> for StepSpec {
    fn from(step: WrappedStep) -> Self {
        StepSpec::Wrapped(step)
    }
}

impl From<Vec<BranchOption>> for StepSpec {
    fn from(options: Vec<BranchOption>) -> Self {
        StepSpec::Branch(options)
    }
}

impl From<&str> for StepSpec {
    fn from(reference: &str) -> Self {
        StepSpec::Reference(reference.to_string())
    }
}

impl From<String> for StepSpec {
    fn from(reference: String) -> Self {
        StepSpec::Reference(reference)
    }
}

impl From<Value> for StepSpec {
    fn from(value: Value) -> Self {
        StepSpec::Value(value)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct DefinitionEntry {
    pub(crate) key: Option<String>,
    pub(crate) spec: StepSpec,
}

/// The initial content of a stack: a name plus keyed or positional entries,
/// in order.
///
/// ```rust
/// use stepstack_engine::model::StepSignature;
/// use stepstack_engine::stack::StackDefinition;
/// use stepstack_engine::step::{StepFn, StepOutcome};
///
/// let definition = StackDefinition::named("billing")
///     .step("load", StepFn::new(StepSignature::new(), |_| Ok(StepOutcome::NoValue)))
///     .entry("shared.audit");
/// assert_eq!(definition.name(), Some("billing"));
/// assert_eq!(definition.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct StackDefinition {
    name: Option<String>,
    entries: Vec<DefinitionEntry>,
}

impl StackDefinition {
    /// An unnamed definition. A name must be set before a stack can be created.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            entries: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Adds an entry keyed by `name`. A step function's own name still wins.
    pub fn step(mut self, name: impl Into<String>, spec: impl Into<StepSpec>) -> Self {
        self.entries.push(DefinitionEntry {
            key: Some(name.into()),
            spec: spec.into(),
        });
        self
    }

    /// Adds a positional entry: a named step function or a reference.
    pub fn entry(mut self, spec: impl Into<StepSpec>) -> Self {
        self.entries.push(DefinitionEntry {
            key: None,
            spec: spec.into(),
        });
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn into_parts(self) -> (Option<String>, Vec<DefinitionEntry>) {
        (self.name, self.entries)
    }
}
