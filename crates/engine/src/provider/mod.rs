//! Value providers: the fallback source for step arguments.
//!
//! Modules:
//! - `memory`: Thread-safe in-memory provider with ready and deferred registrations
//! - `null`: No-op provider for tests and disabled scenarios

mod memory;
mod null;

use std::{fmt, future::Future, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde_json::Value;

pub use memory::InMemoryProvider;
pub use null::NullProvider;

/// Factory producing a deferred value each time the registration is resolved.
pub type ValueFactory = Arc<dyn Fn() -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// A value registered with a provider.
#[derive(Clone)]
pub enum Provided {
    /// Available immediately.
    Ready(Value),
    /// Produced asynchronously on every resolution.
    Deferred(ValueFactory),
}

impl Provided {
    pub fn ready(value: impl Into<Value>) -> Self {
        Provided::Ready(value.into())
    }

    /// Registers an async factory.
    pub fn deferred<F, Fut>(factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Provided::Deferred(Arc::new(move || Box::pin(factory())))
    }

    pub(crate) async fn materialize(&self) -> Result<Value> {
        match self {
            Provided::Ready(value) => Ok(value.clone()),
            Provided::Deferred(factory) => factory().await,
        }
    }
}

impl fmt::Debug for Provided {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provided::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Provided::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

impl From<Value> for Provided {
    fn from(value: Value) -> Self {
        Provided::Ready(value)
    }
}

/// Named-value registry consulted when a step argument is found neither on the
/// context nor on the accumulator.
///
/// Implementations are shared across concurrent executions and must be safe
/// for concurrent registration and resolution.
#[async_trait]
pub trait ValueProvider: Send + Sync + fmt::Debug {
    /// Registers (or replaces) the value known as `name`.
    fn register(&self, name: &str, value: Provided);

    /// Whether `name` can currently be resolved.
    fn can_resolve(&self, name: &str) -> bool;

    /// Resolves `name`, awaiting deferred registrations.
    async fn resolve(&self, name: &str) -> Result<Value>;
}
