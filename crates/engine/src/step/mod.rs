//! # Canonical Steps
//!
//! Every step a stack runs, however it was authored, is invoked through the
//! [`Step`] trait: it receives a [`StepCall`] and returns a future settling to
//! either a [`StepOutcome`] or a thrown [`Fault`].
//!
//! A step reports its result through exactly one channel:
//!
//! - **Return** a [`StepOutcome::Value`] to finish the stack with that value
//! - **Return** a [`StepOutcome::Fault`] to reject the stack
//! - **Return** a [`StepOutcome::Deferred`] future; `Some` finishes, `None` advances
//! - **Return** [`StepOutcome::NoValue`] and drive the [`Next`] continuation instead
//!
//! Modules:
//! - `wrap`: adapts plain step functions into canonical steps
//! - `branch`: ordered conditional dispatch among several handlers

pub mod branch;
pub mod wrap;

use std::{fmt, future::Future, sync::Arc};

use anyhow::Result;
use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::Fault;
use crate::model::{Accumulator, Context};

pub use branch::{BranchOption, Check, Handler, NoMatchingCondition, Predicate, PredicateArgs, When, build_branch};
pub use wrap::{StepArgs, StepFn, passthrough, wrap};

/// A canonical, shareable step.
pub type WrappedStep = Arc<dyn Step>;

/// The uniform invocation shape shared by all steps.
pub trait Step: Send + Sync {
    /// Starts the step. `Err` is the thrown-fault channel.
    fn invoke(&self, call: StepCall) -> BoxFuture<'static, Result<StepOutcome, Fault>>;
}

impl fmt::Debug for dyn Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Step(..)")
    }
}

/// Where the invoked step sits in the running stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepPosition {
    pub index: usize,
    pub is_last: bool,
}

impl StepPosition {
    pub fn new(index: usize, len: usize) -> Self {
        Self {
            index,
            is_last: index + 1 >= len,
        }
    }
}

/// Everything a canonical step receives for one invocation.
pub struct StepCall {
    pub context: Context,
    pub accumulator: Accumulator,
    pub next: Next,
    pub position: StepPosition,
}

/// The result a step reports by returning.
pub enum StepOutcome {
    /// The step handed control to its continuation.
    NoValue,
    /// Finish the stack with this value.
    Value(Value),
    /// Reject the stack with this fault.
    Fault(Fault),
    /// Await the future; `Some` finishes, `None` advances, `Err` rejects.
    ///
    /// Any `Some` finishes the stack, including falsy values such as `0`,
    /// `false` or `""`. Settle to `None` to hand control to the next step.
    Deferred(BoxFuture<'static, Result<Option<Value>, Fault>>),
}

impl StepOutcome {
    pub fn value(value: impl Into<Value>) -> Self {
        StepOutcome::Value(value.into())
    }

    pub fn fault(fault: impl Into<Fault>) -> Self {
        StepOutcome::Fault(fault.into())
    }

    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = Result<Option<Value>, Fault>> + Send + 'static,
    {
        StepOutcome::Deferred(Box::pin(future))
    }

    pub fn is_no_value(&self) -> bool {
        matches!(self, StepOutcome::NoValue)
    }
}

impl fmt::Debug for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::NoValue => f.write_str("NoValue"),
            StepOutcome::Value(value) => f.debug_tuple("Value").field(value).finish(),
            StepOutcome::Fault(fault) => f.debug_tuple("Fault").field(&fault.to_string()).finish(),
            StepOutcome::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

impl From<Value> for StepOutcome {
    fn from(value: Value) -> Self {
        StepOutcome::Value(value)
    }
}

impl From<Option<Value>> for StepOutcome {
    fn from(value: Option<Value>) -> Self {
        value.map_or(StepOutcome::NoValue, StepOutcome::Value)
    }
}

/// What a continuation reported back to the engine.
#[derive(Debug)]
pub(crate) enum Signal {
    Advance,
    Finish(Value),
    Fail(Fault),
}

/// One-shot continuation handed to continuation-style steps.
///
/// Consuming methods guarantee it is called at most once. It may be moved into
/// a spawned task and called later.
#[derive(Debug)]
pub struct Next {
    sender: oneshot::Sender<Signal>,
}

impl Next {
    pub(crate) fn channel() -> (Next, oneshot::Receiver<Signal>) {
        let (sender, receiver) = oneshot::channel();
        (Next { sender }, receiver)
    }

    /// Continue with the following step.
    pub fn proceed(self) {
        self.send(Signal::Advance);
    }

    /// Finish the stack with `value`.
    pub fn finish(self, value: impl Into<Value>) {
        self.send(Signal::Finish(value.into()));
    }

    /// Reject the stack with `fault`.
    pub fn fail(self, fault: impl Into<Fault>) {
        self.send(Signal::Fail(fault.into()));
    }

    /// `Some` finishes, `None` proceeds.
    pub fn resolve(self, value: Option<Value>) {
        match value {
            Some(value) => self.finish(value),
            None => self.proceed(),
        }
    }

    // The engine may already have settled; a late signal is ignored.
    fn send(self, signal: Signal) {
        let _ = self.sender.send(signal);
    }
}
