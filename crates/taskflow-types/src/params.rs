//! Shared parameter store threaded through every task of a flow.
//!
//! `TaskParams` is the mutable key/value bag a flow hands to each task in
//! turn. The engine runs tasks strictly one at a time and passes the store by
//! `&mut`, so it carries no lock of its own.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ParamsError;

/// Mutable string-keyed parameters shared by all tasks in a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskParams {
    values: Map<String, Value>,
}

impl TaskParams {
    /// Create an empty parameter store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a raw JSON value, returning the previous value for `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(key.into(), value.into())
    }

    /// Serialize `value` and store it under `key`.
    pub fn set<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<(), ParamsError> {
        let value = serde_json::to_value(value).map_err(|source| ParamsError::Serialize {
            key: key.to_string(),
            source,
        })?;
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.values.get_mut(key)
    }

    /// Deserialize the value stored under `key`.
    ///
    /// Returns `Ok(None)` when the key is absent.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ParamsError> {
        match self.values.get(key) {
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|source| ParamsError::Deserialize {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Merge `other` into this store; keys in `other` win.
    pub fn extend(&mut self, other: TaskParams) {
        self.values.extend(other.values);
    }

    /// Consume the store and return the underlying JSON object.
    pub fn into_inner(self) -> Map<String, Value> {
        self.values
    }

    /// Snapshot the store as a JSON object value.
    pub fn to_json(&self) -> Value {
        Value::Object(self.values.clone())
    }
}

impl From<Map<String, Value>> for TaskParams {
    fn from(values: Map<String, Value>) -> Self {
        Self { values }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for TaskParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
