//! # Execution Data Model
//!
//! The values that flow through one stack execution:
//!
//! - **Context**: caller-supplied ambient data, read-only for steps
//! - **Accumulator**: the working record threaded through every step; steps may mutate it
//! - **StepSignature**: explicit description of the arguments a step needs
//!
//! ## Usage
//!
//! ```rust
//! use stepstack_engine::model::{Accumulator, Context, StepSignature};
//! use serde_json::json;
//!
//! let context = Context::try_from(json!({ "tenant": "acme" })).unwrap();
//! let accumulator = Accumulator::new();
//! accumulator.insert("count", json!(1));
//!
//! let signature = StepSignature::from_params(&["acc", "tenant", "next"]);
//! assert_eq!(signature.arguments(), ["tenant".to_string()]);
//! assert!(signature.accepts_continuation());
//! # assert_eq!(context.get("tenant"), Some(&json!("acme")));
//! ```

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{Result, bail};
use serde_json::{Map as JsonMap, Value};
use stepstack_util::{matches_attributes, truthy_entry};

/// Parameter names that mark a step's trailing continuation parameter.
pub const CONTINUATION_ALIASES: [&str; 5] = ["next", "cb", "callback", "continue", "done"];

/// Read-only ambient data shared by every step of one execution.
///
/// Cloning is cheap; all clones view the same map.
#[derive(Debug, Clone, Default)]
pub struct Context {
    values: Arc<JsonMap<String, Value>>,
}

impl Context {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the raw entry stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Returns the entry stored under `key` only when it is truthy.
    pub fn truthy(&self, key: &str) -> Option<&Value> {
        truthy_entry(&self.values, key)
    }

    /// Borrows the underlying map.
    pub fn as_map(&self) -> &JsonMap<String, Value> {
        &self.values
    }
}

impl From<JsonMap<String, Value>> for Context {
    fn from(values: JsonMap<String, Value>) -> Self {
        Self { values: Arc::new(values) }
    }
}

impl TryFrom<Value> for Context {
    type Error = anyhow::Error;

    fn try_from(value: Value) -> Result<Self> {
        Ok(Self::from(object_or_empty(value, "context")?))
    }
}

/// Mutable working record threaded through a stack execution.
///
/// Clones alias the same storage, so the record a caller passes to `execute`
/// reflects every mutation made by the steps once execution finishes. Locks are
/// never held across an await point.
#[derive(Debug, Clone, Default)]
pub struct Accumulator {
    values: Arc<RwLock<JsonMap<String, Value>>>,
}

impl Accumulator {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the entry stored under `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.read().get(key).cloned()
    }

    /// Returns a copy of the entry stored under `key` only when it is truthy.
    pub fn truthy(&self, key: &str) -> Option<Value> {
        truthy_entry(&self.read(), key).cloned()
    }

    /// Stores `value` under `key`, returning the previous entry.
    pub fn insert(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.write().insert(key.into(), value)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.write().remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    /// Applies `update` to the underlying map under a single write lock.
    pub fn update<R>(&self, update: impl FnOnce(&mut JsonMap<String, Value>) -> R) -> R {
        update(&mut self.write())
    }

    /// Attribute-subset match of `pattern` against the current entries.
    pub fn matches(&self, pattern: &JsonMap<String, Value>) -> bool {
        matches_attributes(pattern, &self.read())
    }

    /// Copies the current entries out.
    pub fn snapshot(&self) -> JsonMap<String, Value> {
        self.read().clone()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.snapshot())
    }

    /// Whether both handles view the same storage.
    pub fn shares_storage_with(&self, other: &Accumulator) -> bool {
        Arc::ptr_eq(&self.values, &other.values)
    }

    fn read(&self) -> RwLockReadGuard<'_, JsonMap<String, Value>> {
        self.values.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, JsonMap<String, Value>> {
        self.values.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl From<JsonMap<String, Value>> for Accumulator {
    fn from(values: JsonMap<String, Value>) -> Self {
        Self {
            values: Arc::new(RwLock::new(values)),
        }
    }
}

impl TryFrom<Value> for Accumulator {
    type Error = anyhow::Error;

    fn try_from(value: Value) -> Result<Self> {
        Ok(Self::from(object_or_empty(value, "accumulator")?))
    }
}

fn object_or_empty(value: Value, label: &str) -> Result<JsonMap<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(JsonMap::new()),
        other => bail!("{label} must be a JSON object, got {other}"),
    }
}

/// Explicit description of the data a step needs.
///
/// The accumulator is always supplied, so it is not listed. Every listed
/// argument is resolved by name against the context, then the accumulator,
/// then the value provider. A step that accepts the continuation receives the
/// engine's `Next` handle and is expected to call it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepSignature {
    arguments: Vec<String>,
    accepts_continuation: bool,
}

impl StepSignature {
    /// A signature with no data arguments and no continuation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a signature from a full parameter list written the way a step
    /// author would name them: the first entry is the accumulator slot and is
    /// dropped; a trailing continuation alias marks continuation style.
    pub fn from_params(params: &[&str]) -> Self {
        let mut arguments: Vec<String> = params.iter().skip(1).map(|name| name.to_string()).collect();
        let accepts_continuation = arguments.last().is_some_and(|last| Self::is_continuation_alias(last));
        if accepts_continuation {
            arguments.pop();
        }
        Self {
            arguments,
            accepts_continuation,
        }
    }

    /// Appends one named data argument.
    pub fn arg(mut self, name: impl Into<String>) -> Self {
        self.arguments.push(name.into());
        self
    }

    /// Marks the step as continuation style.
    pub fn with_continuation(mut self) -> Self {
        self.accepts_continuation = true;
        self
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    pub fn accepts_continuation(&self) -> bool {
        self.accepts_continuation
    }

    /// Case-sensitive membership test against [`CONTINUATION_ALIASES`].
    pub fn is_continuation_alias(name: &str) -> bool {
        CONTINUATION_ALIASES.contains(&name)
    }
}
