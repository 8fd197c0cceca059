//! Error taxonomy for building and executing stacks.
//!
//! Build-time problems that abort an operation surface as [`StackError`]s
//! returned synchronously from the builder. Problems that only drop a piece of
//! a definition are recorded as [`BuildWarning`]s on the stack instead.
//! Execution failures always converge on a single rejected [`StackError`].

use std::fmt;

use serde_json::Value;
use thiserror::Error;

/// A step-level failure. Steps author faults with `anyhow!`/`bail!`.
pub type Fault = anyhow::Error;

/// Channel through which a step reported its fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOrigin {
    /// The step function returned `Err`, or its arguments could not be resolved.
    Thrown,
    /// The deferred result returned by the step settled to a failure.
    Deferred,
    /// The step returned an explicit fault outcome.
    Returned,
    /// The step failed its continuation.
    Continuation,
}

impl fmt::Display for FaultOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FaultOrigin::Thrown => "thrown",
            FaultOrigin::Deferred => "deferred",
            FaultOrigin::Returned => "returned",
            FaultOrigin::Continuation => "continuation",
        };
        f.write_str(label)
    }
}

/// Errors raised while building or executing a stack.
#[derive(Debug, Error)]
pub enum StackError {
    #[error("Cannot add non-function {name} to stack: {value}")]
    InvalidStep { name: String, value: String },

    #[error("A stack must be initialized with a name")]
    MissingStackName,

    #[error("Cannot add a step without a name to stack '{stack}'")]
    UnnamedStep { stack: String },

    #[error("Stack '{stack}' already contains a step named '{step}'")]
    DuplicateStep { stack: String, step: String },

    #[error("Could not find step '{anchor}' in stack '{stack}' to insert relative to")]
    AnchorNotFound { stack: String, anchor: String },

    #[error("Stack '{stack}' has no steps to execute")]
    EmptyStack { stack: String },

    #[error("Could not invoke step '{step}' as it is not a valid function")]
    StepNotFound { step: String },

    /// Displays exactly the step's fault so callers see the author's message.
    #[error("{fault}")]
    StepFailed {
        step: String,
        origin: FaultOrigin,
        #[source]
        fault: Fault,
    },

    #[error("Step '{step}' dropped its continuation without calling it")]
    ContinuationDropped { step: String },

    #[error("Could not find stack named '{name}'")]
    UnknownStack { name: String },
}

impl StackError {
    /// The underlying step fault, when the execution was rejected by a step.
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            StackError::StepFailed { fault, .. } => Some(fault),
            _ => None,
        }
    }

    /// How the failing step reported its fault.
    pub fn origin(&self) -> Option<FaultOrigin> {
        match self {
            StackError::StepFailed { origin, .. } => Some(*origin),
            _ => None,
        }
    }

    /// Name of the step the error is attributed to, if any.
    pub fn step(&self) -> Option<&str> {
        match self {
            StackError::StepNotFound { step }
            | StackError::StepFailed { step, .. }
            | StackError::ContinuationDropped { step }
            | StackError::DuplicateStep { step, .. } => Some(step),
            _ => None,
        }
    }
}

/// Reasons a `"stack.step"` reference could not be resolved.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("'{reference}' is not a reference of the form 'stack.step'")]
    Malformed { reference: String },

    #[error("Could not find stack named '{stack}' as specified by step '{reference}', it will not be included in the stack")]
    UnknownStack { stack: String, reference: String },

    #[error(
        "Could not find step named '{step}' in stack '{stack}' as specified by step '{reference}', it will not be included in the stack"
    )]
    UnknownStep { stack: String, step: String, reference: String },
}

/// Non-fatal problem found while building a stack. The offending piece is
/// left out and construction continues.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildWarning {
    /// A composition entry named a stack or step that is not registered.
    UnresolvedReference(ReferenceError),
    /// A branch option's `when` was neither a predicate, `true`, nor an object.
    MalformedCondition { step: String, option: usize, when: Value },
    /// A composition entry resolved to a step name the stack already holds.
    DuplicateReference { reference: String, step: String },
}

impl fmt::Display for BuildWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildWarning::UnresolvedReference(error) => write!(f, "{error}"),
            BuildWarning::MalformedCondition { step, option, when } => write!(
                f,
                "A step's 'when' property must be a function or an object instead of {when}. Option {option} of '{step}' will not be included in potential outcomes."
            ),
            BuildWarning::DuplicateReference { reference, step } => write!(
                f,
                "Step '{step}' referenced by '{reference}' is already part of the stack, it will not be included again"
            ),
        }
    }
}
