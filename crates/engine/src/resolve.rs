//! # Argument Resolution
//!
//! Materializes the data arguments a step declared in its [`StepSignature`].
//! Each argument name is looked up in a fixed order:
//!
//! 1. a truthy entry on the execution [`Context`]
//! 2. a truthy entry on the [`Accumulator`]
//! 3. the [`ValueProvider`], when it reports it can resolve the name
//! 4. otherwise the argument is absent
//!
//! Provider lookups may be deferred; all of them are awaited together and the
//! first failure fails the whole resolution.
//!
//! ## Usage
//!
//! ```rust
//! use stepstack_engine::model::{Accumulator, Context, StepSignature};
//! use stepstack_engine::provider::{InMemoryProvider, Provided, ValueProvider};
//! use stepstack_engine::resolve::ArgumentResolver;
//! use serde_json::json;
//!
//! # tokio_test_block(async {
//! let provider = InMemoryProvider::new();
//! provider.register("region", Provided::ready("eu"));
//! let context = Context::try_from(json!({ "tenant": "acme" })).unwrap();
//! let accumulator = Accumulator::new();
//!
//! let signature = StepSignature::new().arg("tenant").arg("region").arg("missing");
//! let resolved = ArgumentResolver::new(&context, &accumulator, &provider)
//!     .resolve(&signature)
//!     .await
//!     .unwrap();
//! assert_eq!(resolved.get("tenant"), Some(&json!("acme")));
//! assert_eq!(resolved.get("region"), Some(&json!("eu")));
//! assert_eq!(resolved.get("missing"), None);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(future: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(future)
//! # }
//! ```

use anyhow::{Context as _, Result};
use futures_util::future::try_join_all;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::trace;

use crate::model::{Accumulator, Context, StepSignature};
use crate::provider::ValueProvider;

/// Where a resolved argument came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentSource {
    Context,
    Accumulator,
    Provider,
    Missing,
}

#[derive(Debug, Clone, PartialEq)]
struct ResolvedArgument {
    value: Option<Value>,
    source: ArgumentSource,
}

/// Arguments resolved for one step invocation, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedArguments {
    values: IndexMap<String, ResolvedArgument>,
}

impl ResolvedArguments {
    /// The value resolved for `name`, if any.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name).and_then(|argument| argument.value.as_ref())
    }

    /// The value at declaration position `index`.
    pub fn positional(&self, index: usize) -> Option<&Value> {
        self.values.get_index(index).and_then(|(_, argument)| argument.value.as_ref())
    }

    /// Where `name` was resolved from. `None` when it was never declared.
    pub fn source(&self, name: &str) -> Option<ArgumentSource> {
        self.values.get(name).map(|argument| argument.source)
    }

    /// Deserializes the value resolved for `name`.
    pub fn parse<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        self.get(name)
            .map(|value| serde_json::from_value(value.clone()).with_context(|| format!("argument '{name}' has an unexpected shape")))
            .transpose()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates `(name, value)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&Value>)> {
        self.values.iter().map(|(name, argument)| (name.as_str(), argument.value.as_ref()))
    }
}

/// Resolves declared argument names against one execution's data sources.
pub struct ArgumentResolver<'a> {
    context: &'a Context,
    accumulator: &'a Accumulator,
    provider: &'a dyn ValueProvider,
}

impl<'a> ArgumentResolver<'a> {
    pub fn new(context: &'a Context, accumulator: &'a Accumulator, provider: &'a dyn ValueProvider) -> Self {
        Self {
            context,
            accumulator,
            provider,
        }
    }

    /// Resolves every argument declared by `signature`.
    ///
    /// # Errors
    ///
    /// Fails with the provider's fault when any deferred provider value fails
    /// to resolve.
    pub async fn resolve(&self, signature: &StepSignature) -> Result<ResolvedArguments> {
        let immediate: Vec<(ArgumentSource, Option<Value>)> =
            signature.arguments().iter().map(|name| self.lookup_immediate(name)).collect();

        let pending = signature
            .arguments()
            .iter()
            .zip(&immediate)
            .filter(|(_, (source, _))| *source == ArgumentSource::Provider)
            .map(|(name, _)| self.provider.resolve(name));
        let mut provided = try_join_all(pending).await?.into_iter();

        let values = signature
            .arguments()
            .iter()
            .zip(immediate)
            .map(|(name, (source, value))| {
                let value = match source {
                    ArgumentSource::Provider => provided.next(),
                    _ => value,
                };
                trace!(argument = %name, source = ?source, present = value.is_some(), "resolved step argument");
                (name.clone(), ResolvedArgument { value, source })
            })
            .collect();

        Ok(ResolvedArguments { values })
    }

    fn lookup_immediate(&self, name: &str) -> (ArgumentSource, Option<Value>) {
        if let Some(value) = self.context.truthy(name) {
            return (ArgumentSource::Context, Some(value.clone()));
        }
        if let Some(value) = self.accumulator.truthy(name) {
            return (ArgumentSource::Accumulator, Some(value));
        }
        if self.provider.can_resolve(name) {
            return (ArgumentSource::Provider, None);
        }
        (ArgumentSource::Missing, None)
    }
}
