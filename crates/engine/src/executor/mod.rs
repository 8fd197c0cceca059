//! Execution engine: walks a [`StackPlan`] one step at a time.
//!
//! Each execution is a small state machine. It starts at `Running(0)` and
//! moves to `Running(index + 1)`, `Resolved(value)` or `Rejected(error)`
//! depending on how the current step reports its outcome. Step N+1 never
//! starts before step N has settled.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use crate::error::{FaultOrigin, StackError};
use crate::model::{Accumulator, Context};
use crate::step::{Next, Signal, StepCall, StepOutcome, StepPosition, WrappedStep};

/// An immutable snapshot of a stack's steps, as executed.
#[derive(Clone)]
pub struct StackPlan {
    name: String,
    steps: Vec<String>,
    calls: HashMap<String, WrappedStep>,
}

impl StackPlan {
    pub fn new(name: impl Into<String>, steps: Vec<String>, calls: HashMap<String, WrappedStep>) -> Self {
        Self {
            name: name.into(),
            steps,
            calls,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[derive(Debug)]
enum ExecutionState {
    Running(usize),
    Resolved(Option<Value>),
    Rejected(StackError),
}

/// Executes `plan` until it resolves or rejects.
///
/// Missing `context` and `accumulator` default to empty ones. The same
/// accumulator handle is passed to every step.
pub async fn execute_plan(
    plan: &StackPlan,
    context: Option<Context>,
    accumulator: Option<Accumulator>,
) -> Result<Option<Value>, StackError> {
    if plan.is_empty() {
        return Err(StackError::EmptyStack { stack: plan.name.clone() });
    }
    let context = context.unwrap_or_default();
    let accumulator = accumulator.unwrap_or_default();

    let mut state = ExecutionState::Running(0);
    loop {
        state = match state {
            ExecutionState::Running(index) => run_step(plan, index, &context, &accumulator).await,
            ExecutionState::Resolved(value) => {
                debug!(stack = %plan.name, has_value = value.is_some(), "stack resolved");
                return Ok(value);
            }
            ExecutionState::Rejected(error) => {
                debug!(stack = %plan.name, step = error.step().unwrap_or_default(), error = %error, "stack rejected");
                return Err(error);
            }
        };
    }
}

async fn run_step(plan: &StackPlan, index: usize, context: &Context, accumulator: &Accumulator) -> ExecutionState {
    let name = &plan.steps[index];
    let Some(step) = plan.calls.get(name) else {
        return ExecutionState::Rejected(StackError::StepNotFound { step: name.clone() });
    };
    let position = StepPosition::new(index, plan.len());
    let (next, signal) = Next::channel();

    debug!(stack = %plan.name, step = %name, index, is_last = position.is_last, "invoking step");
    let call = StepCall {
        context: context.clone(),
        accumulator: accumulator.clone(),
        next,
        position,
    };
    let outcome = match step.invoke(call).await {
        Ok(outcome) => outcome,
        Err(fault) => return rejected(name, FaultOrigin::Thrown, fault),
    };

    match outcome {
        StepOutcome::Value(value) => ExecutionState::Resolved(Some(value)),
        StepOutcome::Fault(fault) => rejected(name, FaultOrigin::Returned, fault),
        StepOutcome::Deferred(pending) => match pending.await {
            Ok(Some(value)) => ExecutionState::Resolved(Some(value)),
            Ok(None) => advance(position),
            Err(fault) => rejected(name, FaultOrigin::Deferred, fault),
        },
        StepOutcome::NoValue => match signal.await {
            Ok(Signal::Advance) => advance(position),
            Ok(Signal::Finish(value)) => ExecutionState::Resolved(Some(value)),
            Ok(Signal::Fail(fault)) => rejected(name, FaultOrigin::Continuation, fault),
            Err(_) => ExecutionState::Rejected(StackError::ContinuationDropped { step: name.clone() }),
        },
    }
}

fn advance(position: StepPosition) -> ExecutionState {
    if position.is_last {
        ExecutionState::Resolved(None)
    } else {
        ExecutionState::Running(position.index + 1)
    }
}

fn rejected(step: &str, origin: FaultOrigin, fault: crate::error::Fault) -> ExecutionState {
    ExecutionState::Rejected(StackError::StepFailed {
        step: step.to_string(),
        origin,
        fault,
    })
}
