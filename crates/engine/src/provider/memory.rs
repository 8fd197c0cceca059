use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{Provided, ValueProvider};

/// In-memory provider backed by a shared map.
///
/// Clones share the same registrations. Deferred registrations are cloned out
/// of the lock before they are awaited, so resolution never blocks writers.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProvider {
    entries: Arc<RwLock<HashMap<String, Provided>>>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered names in no particular order.
    pub fn names(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Removes one registration.
    pub fn remove(&self, name: &str) -> Option<Provided> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).remove(name)
    }

    /// Drops every registration.
    pub fn purge_all(&self) {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    fn lookup(&self, name: &str) -> Option<Provided> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).get(name).cloned()
    }
}

#[async_trait]
impl ValueProvider for InMemoryProvider {
    fn register(&self, name: &str, value: Provided) {
        debug!(name = %name, "registering provided value");
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), value);
    }

    fn can_resolve(&self, name: &str) -> bool {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).contains_key(name)
    }

    async fn resolve(&self, name: &str) -> Result<Value> {
        let provided = self.lookup(name).ok_or_else(|| anyhow!("no value registered for '{name}'"))?;
        provided.materialize().await
    }
}
