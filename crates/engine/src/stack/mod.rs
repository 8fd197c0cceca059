//! # Stacks
//!
//! A [`Stack`] is a named, ordered, mutable pipeline of canonical steps. It is
//! built from a [`StackDefinition`], registered in a [`StackRegistry`], and
//! edited in place with append, prepend and relative insertion. Step names are
//! unique within a stack.
//!
//! `Stack` is a handle: clones of the handle edit the same pipeline. Use
//! [`Stack::clone_as`] to get an independent copy.
//!
//! Editing a stack while one of its executions is in flight does not affect
//! that execution; each execution runs against a snapshot taken when it starts.

mod definition;
mod registry;

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use serde_json::Value;
use tracing::{debug, warn};

pub use definition::{StackDefinition, StepSpec};
pub use registry::StackRegistry;
use registry::{WeakRegistry, split_reference};

use crate::error::{BuildWarning, StackError};
use crate::executor::{StackPlan, execute_plan};
use crate::model::{Accumulator, Context};
use crate::provider::ValueProvider;
use crate::step::{WrappedStep, build_branch, wrap};

#[derive(Clone, Default)]
struct StackState {
    name: String,
    steps: Vec<String>,
    calls: HashMap<String, WrappedStep>,
    warnings: Vec<BuildWarning>,
}

impl StackState {
    fn ensure_absent(&self, step: &str) -> Result<(), StackError> {
        if self.calls.contains_key(step) {
            return Err(StackError::DuplicateStep {
                stack: self.name.clone(),
                step: step.to_string(),
            });
        }
        Ok(())
    }

    fn position(&self, anchor: &str) -> Result<usize, StackError> {
        self.steps
            .iter()
            .position(|step| step == anchor)
            .ok_or_else(|| StackError::AnchorNotFound {
                stack: self.name.clone(),
                anchor: anchor.to_string(),
            })
    }

    fn add_reference(&mut self, registry: &StackRegistry, reference: &str, key: Option<&str>) {
        let resolved = split_reference(reference)
            .and_then(|(_, step)| registry.resolve_reference(reference).map(|call| (step.to_string(), call)));
        match resolved {
            Ok((step, call)) => {
                let step = key.map(str::to_string).unwrap_or(step);
                if self.calls.contains_key(&step) {
                    self.record(BuildWarning::DuplicateReference {
                        reference: reference.to_string(),
                        step,
                    });
                    return;
                }
                debug!(stack = %self.name, step = %step, reference = %reference, "composed step from reference");
                self.steps.push(step.clone());
                self.calls.insert(step, call);
            }
            Err(error) => self.record(BuildWarning::UnresolvedReference(error)),
        }
    }

    fn record(&mut self, warning: BuildWarning) {
        warn!(stack = %self.name, "{warning}");
        self.warnings.push(warning);
    }
}

/// Turns a spec into its final step name and canonical step.
fn materialize(
    provider: &Arc<dyn ValueProvider>,
    stack: &str,
    spec: StepSpec,
    name: Option<&str>,
) -> Result<(String, WrappedStep, Vec<BuildWarning>), StackError> {
    match spec {
        StepSpec::Value(value) => Err(StackError::InvalidStep {
            name: name.unwrap_or_default().to_string(),
            value: value.to_string(),
        }),
        StepSpec::Reference(reference) => Err(StackError::InvalidStep {
            name: name.unwrap_or(&reference).to_string(),
            value: Value::String(reference.clone()).to_string(),
        }),
        StepSpec::Branch(options) if options.is_empty() => Err(StackError::InvalidStep {
            name: name.unwrap_or_default().to_string(),
            value: "[]".to_string(),
        }),
        StepSpec::Function(step) => {
            let step_name = require_name(stack, step.name().or(name))?;
            Ok((step_name, wrap(Arc::clone(provider), &step), Vec::new()))
        }
        StepSpec::Wrapped(call) => Ok((require_name(stack, name)?, call, Vec::new())),
        StepSpec::Branch(options) => {
            let step_name = require_name(stack, name)?;
            let (call, warnings) = build_branch(Arc::clone(provider), &step_name, options);
            Ok((step_name, call, warnings))
        }
    }
}

fn require_name(stack: &str, name: Option<&str>) -> Result<String, StackError> {
    match name {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        _ => Err(StackError::UnnamedStep { stack: stack.to_string() }),
    }
}

enum Placement<'a> {
    Front,
    Back,
    Before(&'a str),
    After(&'a str),
}

/// A named, ordered pipeline of steps.
#[derive(Clone)]
pub struct Stack {
    state: Arc<RwLock<StackState>>,
    registry: WeakRegistry,
    provider: Arc<dyn ValueProvider>,
}

impl Stack {
    /// Builds a stack from `definition` and registers it in `registry`.
    ///
    /// References (`"stack.step"`) are resolved against `registry`; those that
    /// cannot be resolved, or that collide with a step already present, are
    /// dropped and recorded as warnings.
    ///
    /// # Errors
    ///
    /// - [`StackError::MissingStackName`] when the definition has no name
    /// - [`StackError::InvalidStep`] for plain data or an empty branch list
    /// - [`StackError::UnnamedStep`] for a positional entry with no intrinsic name
    /// - [`StackError::DuplicateStep`] when two entries share a name
    pub fn create(
        registry: &StackRegistry,
        provider: Arc<dyn ValueProvider>,
        definition: StackDefinition,
    ) -> Result<Stack, StackError> {
        let (name, entries) = definition.into_parts();
        let name = name.filter(|name| !name.trim().is_empty()).ok_or(StackError::MissingStackName)?;
        let mut state = StackState {
            name,
            ..StackState::default()
        };

        for entry in entries {
            if let StepSpec::Reference(reference) = &entry.spec {
                state.add_reference(registry, reference, entry.key.as_deref());
                continue;
            }
            let (step, call, warnings) = materialize(&provider, &state.name, entry.spec, entry.key.as_deref())?;
            state.ensure_absent(&step)?;
            state.steps.push(step.clone());
            state.calls.insert(step, call);
            state.warnings.extend(warnings);
        }

        debug!(stack = %state.name, steps = state.steps.len(), "created stack");
        let stack = Stack {
            state: Arc::new(RwLock::new(state)),
            registry: registry.downgrade(),
            provider,
        };
        registry.register(stack.clone());
        Ok(stack)
    }

    pub fn name(&self) -> String {
        self.read().name.clone()
    }

    /// Step names in execution order.
    pub fn steps(&self) -> Vec<String> {
        self.read().steps.clone()
    }

    pub fn len(&self) -> usize {
        self.read().steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().steps.is_empty()
    }

    pub fn contains(&self, step: &str) -> bool {
        self.read().calls.contains_key(step)
    }

    /// The canonical step registered under `step`.
    pub fn step(&self, step: &str) -> Option<WrappedStep> {
        self.read().calls.get(step).cloned()
    }

    /// Non-fatal problems recorded while building this stack.
    pub fn warnings(&self) -> Vec<BuildWarning> {
        self.read().warnings.clone()
    }

    /// Snapshot of the current steps, ready to execute.
    pub fn plan(&self) -> StackPlan {
        let state = self.read();
        StackPlan::new(state.name.clone(), state.steps.clone(), state.calls.clone())
    }

    /// Adds a step at the end. A step function's own name wins over `name`.
    pub fn append(&self, spec: impl Into<StepSpec>, name: Option<&str>) -> Result<&Self, StackError> {
        self.place(Placement::Back, spec.into(), name)
    }

    /// Adds a step at the front.
    pub fn prepend(&self, spec: impl Into<StepSpec>, name: Option<&str>) -> Result<&Self, StackError> {
        self.place(Placement::Front, spec.into(), name)
    }

    /// Adds a step immediately before `anchor`.
    pub fn insert_before(&self, anchor: &str, spec: impl Into<StepSpec>, name: Option<&str>) -> Result<&Self, StackError> {
        self.place(Placement::Before(anchor), spec.into(), name)
    }

    /// Adds a step immediately after `anchor`.
    pub fn insert_after(&self, anchor: &str, spec: impl Into<StepSpec>, name: Option<&str>) -> Result<&Self, StackError> {
        self.place(Placement::After(anchor), spec.into(), name)
    }

    /// Copies this stack under `name`, registers the copy and returns it.
    ///
    /// The copy shares the canonical steps but not the step list or mapping,
    /// so later edits to either stack never reach the other.
    pub fn clone_as(&self, name: impl Into<String>) -> Result<Stack, StackError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(StackError::MissingStackName);
        }
        let mut state = self.read().clone();
        let source = std::mem::replace(&mut state.name, name.clone());
        let copy = Stack {
            state: Arc::new(RwLock::new(state)),
            registry: self.registry.clone(),
            provider: Arc::clone(&self.provider),
        };

        debug!(stack = %name, source = %source, "cloned stack");
        if let Some(registry) = self.registry.upgrade() {
            registry.register(copy.clone());
        }
        Ok(copy)
    }

    /// Splices every step of `other`, in order, onto the end of this stack.
    pub fn append_stack(&self, other: &Stack) -> Result<&Self, StackError> {
        self.splice(other, Placement::Back)
    }

    /// Splices every step of `other`, in order, onto the front of this stack.
    pub fn prepend_stack(&self, other: &Stack) -> Result<&Self, StackError> {
        self.splice(other, Placement::Front)
    }

    /// Runs the stack to completion.
    ///
    /// `context` defaults to empty data. `accumulator` defaults to a fresh empty
    /// record; pass a handle to observe the mutations steps make.
    pub async fn execute(&self, context: Option<Context>, accumulator: Option<Accumulator>) -> Result<Option<Value>, StackError> {
        let plan = self.plan();
        execute_plan(&plan, context, accumulator).await
    }

    fn place(&self, placement: Placement<'_>, spec: StepSpec, name: Option<&str>) -> Result<&Self, StackError> {
        let (step, call, warnings) = materialize(&self.provider, &self.name(), spec, name)?;
        let mut state = self.write();
        state.ensure_absent(&step)?;
        let index = match placement {
            Placement::Front => 0,
            Placement::Back => state.steps.len(),
            Placement::Before(anchor) => state.position(anchor)?,
            Placement::After(anchor) => state.position(anchor)? + 1,
        };

        debug!(stack = %state.name, step = %step, index, "added step");
        state.steps.insert(index, step.clone());
        state.calls.insert(step, call);
        state.warnings.extend(warnings);
        Ok(self)
    }

    fn splice(&self, other: &Stack, placement: Placement<'_>) -> Result<&Self, StackError> {
        let (source, steps, calls) = {
            let other = other.read();
            (other.name.clone(), other.steps.clone(), other.calls.clone())
        };
        let mut state = self.write();
        for step in &steps {
            state.ensure_absent(step)?;
        }

        let index = match placement {
            Placement::Front => 0,
            _ => state.steps.len(),
        };
        debug!(stack = %state.name, source = %source, count = steps.len(), index, "spliced stack");
        state.steps.splice(index..index, steps.iter().cloned());
        for step in steps {
            if let Some(call) = calls.get(&step) {
                state.calls.insert(step, Arc::clone(call));
            }
        }
        Ok(self)
    }

    fn read(&self) -> RwLockReadGuard<'_, StackState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StackState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.read();
        f.debug_struct("Stack")
            .field("name", &state.name)
            .field("steps", &state.steps)
            .field("warnings", &state.warnings.len())
            .finish()
    }
}
