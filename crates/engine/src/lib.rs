//! # Stepstack Engine
//!
//! The Stepstack Engine builds and executes **stacks**: named, ordered
//! pipelines of asynchronous steps that share one mutable accumulator. Any step
//! may finish the pipeline early with a value, hand control to the next step,
//! branch among conditional handlers, or fail.
//!
//! ## Key Features
//!
//! - **Uniform step contract**: direct-return, deferred and continuation-style steps all settle the same way
//! - **Explicit signatures**: steps declare the arguments they need; the engine resolves them by name
//! - **Branch steps**: concurrent predicate evaluation with declaration-order dispatch
//! - **Composition**: stacks reuse each other's steps through `"stack.step"` references
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use stepstack_engine::{
//!     Accumulator, NullProvider, Stack, StackDefinition, StackRegistry, StepFn, StepOutcome, StepSignature,
//! };
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let registry = StackRegistry::new();
//! let definition = StackDefinition::named("count")
//!     .step("start", StepFn::new(StepSignature::new(), |args| {
//!         args.accumulator.insert("total", json!(1));
//!         Ok(StepOutcome::NoValue)
//!     }))
//!     .step("finish", StepFn::new(StepSignature::new().arg("total"), |args| {
//!         Ok(StepOutcome::value(args.arguments.get("total").cloned().unwrap_or_default()))
//!     }));
//! let stack = Stack::create(&registry, Arc::new(NullProvider), definition).unwrap();
//!
//! let accumulator = Accumulator::new();
//! let value = stack.execute(None, Some(accumulator.clone())).await.unwrap();
//! assert_eq!(value, Some(json!(1)));
//! # });
//! ```
//!
//! ## Architecture
//!
//! - **`model`**: context, accumulator and step signatures
//! - **`resolve`**: argument resolution against context, accumulator and provider
//! - **`step`**: the canonical step contract, the step wrapper and branch steps
//! - **`stack`**: the stack builder and the stack registry
//! - **`executor`**: the execution state machine
//! - **`provider`**: value providers used as the fallback argument source
//! - **`runtime`**: registry, provider and configuration bundled together
//! - **`config`**: runtime configuration loading

use std::sync::Arc;

use once_cell::sync::Lazy;

pub mod config;
pub mod error;
pub mod executor;
pub mod model;
pub mod provider;
pub mod resolve;
pub mod runtime;
pub mod stack;
pub mod step;

// Re-export commonly used types for convenience
pub use config::{ConfigError, RuntimeConfig, default_config_path, load_config, load_config_from_path};
pub use error::{BuildWarning, Fault, FaultOrigin, ReferenceError, StackError};
pub use executor::{StackPlan, execute_plan};
pub use model::{Accumulator, Context, StepSignature};
pub use provider::{InMemoryProvider, NullProvider, Provided, ValueProvider};
pub use resolve::{ArgumentResolver, ArgumentSource, ResolvedArguments};
pub use runtime::{StackModule, StackRuntime};
pub use stack::{Stack, StackDefinition, StackRegistry, StepSpec};
pub use step::{
    BranchOption, Check, Handler, Next, NoMatchingCondition, Predicate, PredicateArgs, Step, StepArgs, StepCall, StepFn, StepOutcome,
    StepPosition, When, WrappedStep,
};

static GLOBAL_PROVIDER: Lazy<Arc<InMemoryProvider>> = Lazy::new(|| Arc::new(InMemoryProvider::new()));

/// The process-wide value provider paired with [`StackRegistry::global`].
pub fn global_provider() -> Arc<dyn ValueProvider> {
    GLOBAL_PROVIDER.clone()
}

/// Creates a stack against the process-wide registry and provider.
pub fn create_stack(definition: StackDefinition) -> Result<Stack, StackError> {
    Stack::create(StackRegistry::global(), global_provider(), definition)
}
