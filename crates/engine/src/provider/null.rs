use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::Value;

use super::{Provided, ValueProvider};

/// Provider that knows no values and ignores registrations.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProvider;

#[async_trait]
impl ValueProvider for NullProvider {
    fn register(&self, _name: &str, _value: Provided) {}

    fn can_resolve(&self, _name: &str) -> bool {
        false
    }

    async fn resolve(&self, name: &str) -> Result<Value> {
        bail!("no value provider is configured to resolve '{name}'")
    }
}
