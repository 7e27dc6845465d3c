//! Template variables and the per-message render cache.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

/// A lazily evaluated template variable.
pub type LazyValue = Arc<dyn Fn() -> Value + Send + Sync>;

/// A template variable: a plain value or a function evaluated on access.
#[derive(Clone)]
pub enum Param {
    /// A plain value.
    Value(Value),
    /// Called each time a template reads it.
    Lazy(LazyValue),
}

impl fmt::Debug for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}

impl Param {
    /// Returns the value, calling the function for lazy params.
    #[must_use]
    pub fn resolve(&self) -> Value {
        match self {
            Self::Value(value) => value.clone(),
            Self::Lazy(func) => func(),
        }
    }
}

impl<T: Into<Value>> From<T> for Param {
    fn from(value: T) -> Self {
        Self::Value(value.into())
    }
}

/// Named template variables.
#[derive(Debug, Clone, Default)]
pub struct Params {
    entries: BTreeMap<String, Param>,
}

impl Params {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a plain variable.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(name.into(), Param::Value(value.into()));
    }

    /// Sets a variable that is computed every time it is read.
    pub fn set_lazy<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.entries.insert(name.into(), Param::Lazy(Arc::new(func)));
    }

    /// Returns a variable.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Param> {
        self.entries.get(name)
    }

    /// Removes a variable.
    pub fn remove(&mut self, name: &str) -> Option<Param> {
        self.entries.remove(name)
    }

    /// Copies every entry of `other` over this set.
    pub fn extend(&mut self, other: &Self) {
        for (name, param) in &other.entries {
            self.entries.insert(name.clone(), param.clone());
        }
    }

    /// Iterates over the variables in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Param)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns true if there are no variables.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Memoizes values across renders of one message.
///
/// Templates opt in by routing a computation through the cache; nothing is
/// cached implicitly.
#[derive(Debug, Clone, Default)]
pub struct RenderCache {
    values: Arc<Mutex<BTreeMap<String, Value>>>,
}

impl RenderCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached value for `key`, computing and storing it first
    /// if absent.
    ///
    /// # Errors
    ///
    /// Propagates the error of `compute`; nothing is stored in that case.
    pub fn get_or_try_insert_with<E>(
        &self,
        key: &str,
        compute: impl FnOnce() -> Result<Value, E>,
    ) -> Result<Value, E> {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = compute()?;
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.clone());
        Ok(value)
    }

    /// Returns a cached value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Forgets every cached value.
    pub fn clear(&self) {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
