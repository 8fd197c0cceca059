//! # Branch Steps
//!
//! A branch step holds an ordered list of [`BranchOption`]s, each pairing a
//! [`When`] condition with a [`Handler`]. On invocation every condition is
//! evaluated concurrently, then the first option in declared order whose
//! condition held runs as the step. Completion order never matters.
//!
//! When nothing matches, a branch in the terminal position rejects with
//! [`NoMatchingCondition`]; anywhere else it hands control to the next step.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use stepstack_engine::model::StepSignature;
//! use stepstack_engine::provider::NullProvider;
//! use stepstack_engine::step::{BranchOption, Predicate, StepFn, StepOutcome, When, build_branch};
//!
//! let options = vec![
//!     BranchOption::new(
//!         When::Test(Predicate::ready(StepSignature::new(), |args| Ok(args.accumulator.contains_key("vip")))),
//!         StepFn::new(StepSignature::new(), |_| Ok(StepOutcome::value("priority"))),
//!     ),
//!     BranchOption::pass(When::Literal(json!({ "status": "new" }))),
//!     BranchOption::new(When::Literal(json!(true)), StepFn::new(StepSignature::new(), |_| Ok(StepOutcome::value("standard")))),
//! ];
//! let (_step, warnings) = build_branch(Arc::new(NullProvider), "route", options);
//! assert!(warnings.is_empty());
//! ```

use std::{fmt, sync::Arc};

use anyhow::Result;
use futures_util::future::{BoxFuture, try_join_all};
use serde_json::{Map as JsonMap, Value};
use thiserror::Error;
use tracing::{debug, warn};

use super::{Step, StepCall, StepFn, StepOutcome, WrappedStep, passthrough, wrap};
use crate::error::BuildWarning;
use crate::model::{Accumulator, Context, StepSignature};
use crate::provider::ValueProvider;
use crate::resolve::{ArgumentResolver, ResolvedArguments};

/// Fault raised by a terminal branch step when no condition held.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Error)]
#[error("The call stack failed to meet any of the supported conditions")]
pub struct NoMatchingCondition;

/// Result of a predicate: known now, or still being computed.
pub enum Check {
    Ready(bool),
    Deferred(BoxFuture<'static, Result<bool>>),
}

impl Check {
    async fn settle(self) -> Result<bool> {
        match self {
            Check::Ready(matched) => Ok(matched),
            Check::Deferred(pending) => pending.await,
        }
    }
}

impl From<bool> for Check {
    fn from(matched: bool) -> Self {
        Check::Ready(matched)
    }
}

/// What a predicate receives once its arguments are resolved.
pub struct PredicateArgs {
    pub accumulator: Accumulator,
    pub arguments: ResolvedArguments,
    pub context: Context,
}

type PredicateBody = dyn Fn(PredicateArgs) -> Result<Check> + Send + Sync;

/// A branch condition evaluated against the running execution. Its arguments
/// are resolved exactly like a step's.
#[derive(Clone)]
pub struct Predicate {
    signature: Arc<StepSignature>,
    body: Arc<PredicateBody>,
}

impl Predicate {
    pub fn new<F>(signature: StepSignature, body: F) -> Self
    where
        F: Fn(PredicateArgs) -> Result<Check> + Send + Sync + 'static,
    {
        Self {
            signature: Arc::new(signature),
            body: Arc::new(body),
        }
    }

    /// A predicate that answers synchronously.
    pub fn ready<F>(signature: StepSignature, body: F) -> Self
    where
        F: Fn(PredicateArgs) -> Result<bool> + Send + Sync + 'static,
    {
        Self::new(signature, move |args| body(args).map(Check::Ready))
    }

    async fn evaluate(&self, context: &Context, accumulator: &Accumulator, provider: &dyn ValueProvider) -> Result<bool> {
        let arguments = ArgumentResolver::new(context, accumulator, provider)
            .resolve(&self.signature)
            .await?;
        let check = (self.body)(PredicateArgs {
            accumulator: accumulator.clone(),
            arguments,
            context: context.clone(),
        })?;
        check.settle().await
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate").field("signature", &self.signature).finish_non_exhaustive()
    }
}

/// The condition of one branch option.
#[derive(Debug, Clone)]
pub enum When {
    Test(Predicate),
    /// `true` always holds; an object holds when every attribute equals the
    /// accumulator's. Anything else is malformed and the option is dropped.
    Literal(Value),
}

impl From<Predicate> for When {
    fn from(predicate: Predicate) -> Self {
        When::Test(predicate)
    }
}

impl From<Value> for When {
    fn from(value: Value) -> Self {
        When::Literal(value)
    }
}

/// What runs when an option is selected.
#[derive(Clone)]
pub enum Handler {
    Step(StepFn),
    Wrapped(WrappedStep),
    Passthrough,
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Step(step) => f.debug_tuple("Step").field(step).finish(),
            Handler::Wrapped(_) => f.write_str("Wrapped(..)"),
            Handler::Passthrough => f.write_str("Passthrough"),
        }
    }
}

impl From<StepFn> for Handler {
    fn from(step: StepFn) -> Self {
        Handler::Step(step)
    }
}

impl From<WrappedStep> for Handler {
    fn from(step: WrappedStep) -> Self {
        Handler::Wrapped(step)
    }
}

/// One `when`/`then` pair of a branch step.
#[derive(Debug, Clone)]
pub struct BranchOption {
    pub when: When,
    pub then: Handler,
}

impl BranchOption {
    pub fn new(when: impl Into<When>, then: impl Into<Handler>) -> Self {
        Self {
            when: when.into(),
            then: then.into(),
        }
    }

    /// An option whose handler simply moves on to the next step.
    pub fn pass(when: impl Into<When>) -> Self {
        Self {
            when: when.into(),
            then: Handler::Passthrough,
        }
    }
}

enum Condition {
    Always,
    Matches(JsonMap<String, Value>),
    Test(Predicate),
}

impl Condition {
    async fn holds(&self, context: &Context, accumulator: &Accumulator, provider: &dyn ValueProvider) -> Result<bool> {
        match self {
            Condition::Always => Ok(true),
            Condition::Matches(pattern) => Ok(accumulator.matches(pattern)),
            Condition::Test(predicate) => predicate.evaluate(context, accumulator, provider).await,
        }
    }
}

struct Arm {
    condition: Condition,
    handler: WrappedStep,
}

struct BranchStep {
    name: String,
    arms: Arc<Vec<Arm>>,
    provider: Arc<dyn ValueProvider>,
}

impl Step for BranchStep {
    fn invoke(&self, call: StepCall) -> BoxFuture<'static, Result<StepOutcome>> {
        let name = self.name.clone();
        let arms = Arc::clone(&self.arms);
        let provider = Arc::clone(&self.provider);

        Box::pin(async move {
            let checks = arms
                .iter()
                .map(|arm| arm.condition.holds(&call.context, &call.accumulator, provider.as_ref()));
            let results = try_join_all(checks).await?;

            match results.iter().position(|matched| *matched) {
                Some(selected) => {
                    debug!(step = %name, option = selected, "branch option selected");
                    arms[selected].handler.invoke(call).await
                }
                None if call.position.is_last => {
                    debug!(step = %name, "no branch option matched in terminal position");
                    Ok(StepOutcome::fault(NoMatchingCondition))
                }
                None => {
                    debug!(step = %name, "no branch option matched, falling through");
                    call.next.proceed();
                    Ok(StepOutcome::NoValue)
                }
            }
        })
    }
}

/// Builds the canonical step for the branch named `step_name`.
///
/// Options with a malformed literal condition are left out and reported in the
/// returned warnings.
pub fn build_branch(
    provider: Arc<dyn ValueProvider>,
    step_name: &str,
    options: Vec<BranchOption>,
) -> (WrappedStep, Vec<BuildWarning>) {
    let mut warnings = Vec::new();
    let mut arms = Vec::with_capacity(options.len());

    for (index, option) in options.into_iter().enumerate() {
        let condition = match option.when {
            When::Test(predicate) => Condition::Test(predicate),
            When::Literal(Value::Bool(true)) => Condition::Always,
            When::Literal(Value::Object(pattern)) => Condition::Matches(pattern),
            When::Literal(other) => {
                let warning = BuildWarning::MalformedCondition {
                    step: step_name.to_string(),
                    option: index,
                    when: other,
                };
                warn!(step = %step_name, option = index, "{warning}");
                warnings.push(warning);
                continue;
            }
        };
        let handler = match option.then {
            Handler::Step(step) => wrap(Arc::clone(&provider), &step),
            Handler::Wrapped(step) => step,
            Handler::Passthrough => passthrough(),
        };
        arms.push(Arm { condition, handler });
    }

    let step = BranchStep {
        name: step_name.to_string(),
        arms: Arc::new(arms),
        provider,
    };
    (Arc::new(step), warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::NullProvider;
    use crate::step::{Next, Signal, StepPosition};
    use anyhow::anyhow;
    use serde_json::json;
    use std::time::Duration;

    fn returning(value: &'static str) -> StepFn {
        StepFn::new(StepSignature::new(), move |_| Ok(StepOutcome::value(value)))
    }

    fn invoke_call(accumulator: Accumulator, is_last: bool) -> (StepCall, tokio::sync::oneshot::Receiver<Signal>) {
        let (next, receiver) = Next::channel();
        let call = StepCall {
            context: Context::new(),
            accumulator,
            next,
            position: StepPosition { index: 1, is_last },
        };
        (call, receiver)
    }

    #[tokio::test]
    async fn declaration_order_beats_completion_order() {
        let slow = Predicate::new(StepSignature::new(), |_| {
            Ok(Check::Deferred(Box::pin(async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok(true)
            })))
        });
        let fast = Predicate::ready(StepSignature::new(), |_| Ok(true));
        let (step, warnings) = build_branch(
            Arc::new(NullProvider),
            "route",
            vec![BranchOption::new(slow, returning("first")), BranchOption::new(fast, returning("second"))],
        );
        assert!(warnings.is_empty());

        let (call, _receiver) = invoke_call(Accumulator::new(), false);
        let outcome = step.invoke(call).await.unwrap();
        assert!(matches!(outcome, StepOutcome::Value(value) if value == json!("first")));
    }

    #[tokio::test]
    async fn predicates_are_evaluated_concurrently() {
        let barrier = Arc::new(tokio::sync::Barrier::new(3));
        let waiting = |matched: bool| {
            let barrier = Arc::clone(&barrier);
            Predicate::new(StepSignature::new(), move |_| {
                let barrier = Arc::clone(&barrier);
                Ok(Check::Deferred(Box::pin(async move {
                    barrier.wait().await;
                    Ok(matched)
                })))
            })
        };
        let (step, _) = build_branch(
            Arc::new(NullProvider),
            "route",
            vec![
                BranchOption::new(waiting(false), returning("first")),
                BranchOption::new(waiting(false), returning("second")),
                BranchOption::new(waiting(true), returning("hit")),
            ],
        );

        let (call, _receiver) = invoke_call(Accumulator::new(), true);
        let outcome = tokio::time::timeout(Duration::from_secs(2), step.invoke(call))
            .await
            .expect("predicates waited on each other")
            .unwrap();
        assert!(matches!(outcome, StepOutcome::Value(value) if value == json!("hit")));
    }

    #[tokio::test]
    async fn literal_object_matches_accumulator_attributes() {
        let (step, _) = build_branch(
            Arc::new(NullProvider),
            "route",
            vec![
                BranchOption::new(json!({"kind": "b"}), returning("b")),
                BranchOption::new(json!({"kind": "a"}), returning("a")),
            ],
        );

        let accumulator = Accumulator::try_from(json!({"kind": "a", "other": 1})).unwrap();
        let (call, _receiver) = invoke_call(accumulator, true);
        let outcome = step.invoke(call).await.unwrap();
        assert!(matches!(outcome, StepOutcome::Value(value) if value == json!("a")));
    }

    #[tokio::test]
    async fn terminal_branch_without_match_returns_fault() {
        let (step, _) = build_branch(
            Arc::new(NullProvider),
            "route",
            vec![BranchOption::new(json!({"kind": "x"}), returning("x"))],
        );

        let (call, _receiver) = invoke_call(Accumulator::new(), true);
        let outcome = step.invoke(call).await.unwrap();
        match outcome {
            StepOutcome::Fault(fault) => {
                assert_eq!(fault.to_string(), "The call stack failed to meet any of the supported conditions");
                assert!(fault.downcast_ref::<NoMatchingCondition>().is_some());
            }
            other => panic!("expected a fault, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn inner_branch_without_match_falls_through() {
        let (step, _) = build_branch(
            Arc::new(NullProvider),
            "route",
            vec![BranchOption::new(json!({"kind": "x"}), returning("x"))],
        );

        let (call, receiver) = invoke_call(Accumulator::new(), false);
        assert!(step.invoke(call).await.unwrap().is_no_value());
        assert!(matches!(receiver.await, Ok(Signal::Advance)));
    }

    #[tokio::test]
    async fn passthrough_option_proceeds() {
        let (step, _) = build_branch(Arc::new(NullProvider), "route", vec![BranchOption::pass(json!(true))]);

        let (call, receiver) = invoke_call(Accumulator::new(), true);
        assert!(step.invoke(call).await.unwrap().is_no_value());
        assert!(matches!(receiver.await, Ok(Signal::Advance)));
    }

    #[tokio::test]
    async fn malformed_conditions_are_dropped_with_warning() {
        let (step, warnings) = build_branch(
            Arc::new(NullProvider),
            "route",
            vec![BranchOption::new(json!("yes"), returning("never")), BranchOption::new(json!(true), returning("fallback"))],
        );

        assert_eq!(
            warnings,
            vec![BuildWarning::MalformedCondition {
                step: "route".into(),
                option: 0,
                when: json!("yes"),
            }]
        );
        let (call, _receiver) = invoke_call(Accumulator::new(), true);
        let outcome = step.invoke(call).await.unwrap();
        assert!(matches!(outcome, StepOutcome::Value(value) if value == json!("fallback")));
    }

    #[tokio::test]
    async fn predicate_faults_are_thrown() {
        let failing = Predicate::ready(StepSignature::new(), |_| Err(anyhow!("cannot decide")));
        let (step, _) = build_branch(Arc::new(NullProvider), "route", vec![BranchOption::new(failing, returning("x"))]);

        let (call, _receiver) = invoke_call(Accumulator::new(), true);
        let error = step.invoke(call).await.unwrap_err();
        assert_eq!(error.to_string(), "cannot decide");
    }
}
