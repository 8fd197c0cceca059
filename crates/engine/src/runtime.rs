//! # Stack Runtime
//!
//! [`StackRuntime`] bundles a [`StackRegistry`], a [`ValueProvider`] and a
//! [`RuntimeConfig`] so callers can create, load and execute stacks by name
//! without threading the pieces through by hand.
//!
//! ## Usage
//!
//! ```rust
//! use stepstack_engine::{StackDefinition, StackModule, StackRuntime, StepFn, StepOutcome, StepSignature};
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let runtime = StackRuntime::default();
//! let loaded = runtime
//!     .load(vec![StackModule::single(
//!         "greeting",
//!         StackDefinition::new().step("hello", StepFn::new(StepSignature::new(), |_| Ok(StepOutcome::value("hi")))),
//!     )])
//!     .unwrap();
//! assert!(loaded.contains_key("greeting"));
//!
//! let value = runtime.execute("greeting", None, None).await.unwrap();
//! assert_eq!(value, Some(serde_json::json!("hi")));
//! # });
//! ```

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::RuntimeConfig;
use crate::error::StackError;
use crate::model::{Accumulator, Context};
use crate::provider::{InMemoryProvider, ValueProvider};
use crate::stack::{Stack, StackDefinition, StackRegistry};

/// An already resolved unit of stack definitions.
#[derive(Debug, Clone)]
pub enum StackModule {
    /// One definition. Unnamed definitions take the module's name.
    Single { module: String, definition: StackDefinition },
    /// Several definitions, each carrying its own name.
    Many(Vec<StackDefinition>),
    /// Several definitions keyed by stack name. The key always names the stack.
    Keyed(IndexMap<String, StackDefinition>),
}

impl StackModule {
    pub fn single(module: impl Into<String>, definition: StackDefinition) -> Self {
        StackModule::Single {
            module: module.into(),
            definition,
        }
    }

    fn into_definitions(self) -> Vec<StackDefinition> {
        match self {
            StackModule::Single { module, definition } if definition.name().is_none() => {
                vec![definition.with_name(module)]
            }
            StackModule::Single { definition, .. } => vec![definition],
            StackModule::Many(definitions) => definitions,
            StackModule::Keyed(definitions) => definitions
                .into_iter()
                .map(|(name, definition)| definition.with_name(name))
                .collect(),
        }
    }
}

/// Registry, provider and configuration for one family of stacks.
#[derive(Debug, Clone)]
pub struct StackRuntime {
    config: RuntimeConfig,
    registry: StackRegistry,
    provider: Arc<dyn ValueProvider>,
}

impl Default for StackRuntime {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl StackRuntime {
    /// A runtime with a private registry and an in-memory provider.
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_parts(config, StackRegistry::new(), Arc::new(InMemoryProvider::new()))
    }

    pub fn with_parts(config: RuntimeConfig, registry: StackRegistry, provider: Arc<dyn ValueProvider>) -> Self {
        Self {
            config,
            registry,
            provider,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn registry(&self) -> &StackRegistry {
        &self.registry
    }

    pub fn provider(&self) -> &Arc<dyn ValueProvider> {
        &self.provider
    }

    /// Creates and registers a stack. `name`, when given, replaces the
    /// definition's own name.
    pub fn stack(&self, definition: StackDefinition, name: Option<&str>) -> Result<Stack, StackError> {
        let definition = match name {
            Some(name) => definition.with_name(name),
            None => definition,
        };
        Stack::create(&self.registry, Arc::clone(&self.provider), definition)
    }

    /// Builds every definition in `modules`, in order, so later definitions
    /// may reference steps of earlier ones. Stacks that end up with no steps
    /// are left out of the result.
    pub fn load(&self, modules: Vec<StackModule>) -> Result<IndexMap<String, Stack>, StackError> {
        let mut loaded = IndexMap::new();
        for definition in modules.into_iter().flat_map(StackModule::into_definitions) {
            let stack = self.stack(definition, None)?;
            if stack.is_empty() {
                debug!(container = %self.config.container, stack = %stack.name(), "discarding stack without steps");
                continue;
            }
            loaded.insert(stack.name(), stack);
        }
        info!(container = %self.config.container, count = loaded.len(), "loaded stacks");
        Ok(loaded)
    }

    /// Executes the registered stack called `name`.
    pub async fn execute(
        &self,
        name: &str,
        context: Option<Context>,
        accumulator: Option<Accumulator>,
    ) -> Result<Option<Value>, StackError> {
        let stack = self.registry.lookup(name).ok_or_else(|| StackError::UnknownStack { name: name.to_string() })?;
        stack.execute(context, accumulator).await
    }
}
