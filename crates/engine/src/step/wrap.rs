//! Adapts step functions into canonical [`Step`]s.

use std::{fmt, sync::Arc};

use anyhow::{Result, anyhow};
use futures_util::future::BoxFuture;
use tracing::trace;

use super::{Next, Step, StepCall, StepOutcome, StepPosition, WrappedStep};
use crate::model::{Accumulator, Context, StepSignature};
use crate::provider::ValueProvider;
use crate::resolve::{ArgumentResolver, ResolvedArguments};

type StepBody = dyn Fn(StepArgs) -> Result<StepOutcome> + Send + Sync;

/// What a step function receives once its arguments are resolved.
pub struct StepArgs {
    pub accumulator: Accumulator,
    pub arguments: ResolvedArguments,
    pub context: Context,
    pub position: StepPosition,
    next: Option<Next>,
}

impl StepArgs {
    /// Takes the continuation. Only available to steps whose signature accepts it.
    pub fn take_next(&mut self) -> Result<Next> {
        self.next
            .take()
            .ok_or_else(|| anyhow!("this step does not accept a continuation"))
    }
}

/// A step function together with its explicit signature and optional
/// intrinsic name.
#[derive(Clone)]
pub struct StepFn {
    name: Option<String>,
    signature: Arc<StepSignature>,
    body: Arc<StepBody>,
}

impl StepFn {
    pub fn new<F>(signature: StepSignature, body: F) -> Self
    where
        F: Fn(StepArgs) -> Result<StepOutcome> + Send + Sync + 'static,
    {
        Self {
            name: None,
            signature: Arc::new(signature),
            body: Arc::new(body),
        }
    }

    /// A step function with an intrinsic name. The intrinsic name wins over
    /// any name supplied when the step is added to a stack.
    pub fn named<F>(name: impl Into<String>, signature: StepSignature, body: F) -> Self
    where
        F: Fn(StepArgs) -> Result<StepOutcome> + Send + Sync + 'static,
    {
        Self::new(signature, body).with_name(name)
    }

    /// Sets the intrinsic name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn signature(&self) -> &StepSignature {
        &self.signature
    }
}

impl fmt::Debug for StepFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepFn")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

struct FunctionStep {
    signature: Arc<StepSignature>,
    body: Arc<StepBody>,
    provider: Arc<dyn ValueProvider>,
}

impl Step for FunctionStep {
    fn invoke(&self, call: StepCall) -> BoxFuture<'static, Result<StepOutcome>> {
        let signature = Arc::clone(&self.signature);
        let body = Arc::clone(&self.body);
        let provider = Arc::clone(&self.provider);

        Box::pin(async move {
            let StepCall {
                context,
                accumulator,
                next,
                position,
            } = call;
            let arguments = ArgumentResolver::new(&context, &accumulator, provider.as_ref())
                .resolve(&signature)
                .await?;

            if signature.accepts_continuation() {
                return body(StepArgs {
                    accumulator,
                    arguments,
                    context,
                    position,
                    next: Some(next),
                });
            }

            let outcome = body(StepArgs {
                accumulator,
                arguments,
                context,
                position,
                next: None,
            })?;
            if outcome.is_no_value() {
                trace!(index = position.index, "step returned nothing, continuing");
                next.proceed();
            }
            Ok(outcome)
        })
    }
}

/// Wraps `step` into a canonical step that resolves its arguments through
/// `provider` on every invocation.
pub fn wrap(provider: Arc<dyn ValueProvider>, step: &StepFn) -> WrappedStep {
    Arc::new(FunctionStep {
        signature: Arc::clone(&step.signature),
        body: Arc::clone(&step.body),
        provider,
    })
}

struct Passthrough;

impl Step for Passthrough {
    fn invoke(&self, call: StepCall) -> BoxFuture<'static, Result<StepOutcome>> {
        call.next.proceed();
        Box::pin(async { Ok(StepOutcome::NoValue) })
    }
}

/// A step that does nothing and hands control to the next step.
pub fn passthrough() -> WrappedStep {
    Arc::new(Passthrough)
}
