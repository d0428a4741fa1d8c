//! Context - グループ内のタスクが共有するプロパティ袋
//!
//! 値は `serde_json::Value` として保持し、`get::<T>()` で型付きに取り出す。
//! 取り出しの失敗は「未登録」と「型不一致」を区別して返す。

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::ContextError;

const LAST_RESULT: &str = "<last result>";

/// Property bag plus the most recent task result, owned by one group.
#[derive(Debug, Default)]
pub struct Context {
    group: String,
    properties: Map<String, Value>,
    last_result: Option<Value>,
}

impl Context {
    pub fn new(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            properties: Map::new(),
            last_result: None,
        }
    }

    /// Name of the owning group.
    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn set<T: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: T,
    ) -> Result<(), ContextError> {
        let key = key.into();
        match serde_json::to_value(value) {
            Ok(value) => {
                self.properties.insert(key, value);
                Ok(())
            }
            Err(source) => Err(ContextError::Encode { key, source }),
        }
    }

    /// Typed lookup: `NotFound` when absent, `TypeMismatch` when the stored
    /// value does not decode as `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, ContextError> {
        let value = self.properties.get(key).ok_or_else(|| ContextError::NotFound {
            key: key.to_string(),
        })?;
        decode(key, value)
    }

    pub fn get_raw(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.properties.remove(key)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Result of the most recent successful `run`, if any task has run yet.
    pub fn last_result<T: DeserializeOwned>(&self) -> Result<Option<T>, ContextError> {
        self.last_result
            .as_ref()
            .map(|value| decode(LAST_RESULT, value))
            .transpose()
    }

    pub fn last_result_raw(&self) -> Option<&Value> {
        self.last_result.as_ref()
    }

    pub(crate) fn set_last_result(&mut self, value: Value) {
        self.last_result = Some(value);
    }

    /// Drops every property. Runs once per group, on every exit path.
    pub(crate) fn close(&mut self) {
        self.properties.clear();
        self.last_result = None;
    }
}

fn decode<T: DeserializeOwned>(key: &str, value: &Value) -> Result<T, ContextError> {
    <T as Deserialize>::deserialize(value).map_err(|source| ContextError::TypeMismatch {
        key: key.to_string(),
        expected: std::any::type_name::<T>(),
        source,
    })
}
