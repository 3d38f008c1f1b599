//! Externally supplied parameter defaults, scoped by subcommand name.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::value::{Value, ValueProducer};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DefaultMapError {
    #[error("default map must be a JSON object, found {0}")]
    NotAnObject(&'static str),
    #[error("unsupported default for \"{key}\": {kind}")]
    Unsupported { key: String, kind: &'static str },
}

#[derive(Clone)]
pub enum DefaultEntry {
    Value(Value),
    /// Invoked on every lookup.
    Producer(ValueProducer),
    /// Defaults for the subcommand of this name.
    Nested(Arc<DefaultMap>),
}

impl fmt::Debug for DefaultEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Producer(_) => f.write_str("Producer(..)"),
            Self::Nested(map) => f.debug_tuple("Nested").field(map).finish(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DefaultMap {
    entries: IndexMap<String, DefaultEntry>,
}

impl DefaultMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.insert(name.into(), DefaultEntry::Value(value.into()));
        self
    }

    pub fn with_producer(
        mut self,
        name: impl Into<String>,
        producer: impl Fn() -> Value + Send + Sync + 'static,
    ) -> Self {
        self.entries
            .insert(name.into(), DefaultEntry::Producer(Arc::new(producer)));
        self
    }

    pub fn with_command(mut self, name: impl Into<String>, defaults: DefaultMap) -> Self {
        self.entries
            .insert(name.into(), DefaultEntry::Nested(Arc::new(defaults)));
        self
    }

    pub fn get(&self, name: &str) -> Option<&DefaultEntry> {
        self.entries.get(name)
    }

    /// Default for the parameter `name`; producers run on each call.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        match self.entries.get(name)? {
            DefaultEntry::Value(v) => Some(v.clone()),
            DefaultEntry::Producer(produce) => Some(produce()),
            DefaultEntry::Nested(_) => None,
        }
    }

    pub fn for_command(&self, name: &str) -> Option<Arc<DefaultMap>> {
        match self.entries.get(name)? {
            DefaultEntry::Nested(map) => Some(Arc::clone(map)),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Objects nest, arrays become tuples, `null` entries are skipped.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, DefaultMapError> {
        let serde_json::Value::Object(object) = json else {
            return Err(DefaultMapError::NotAnObject(json_kind(json)));
        };
        let mut entries = IndexMap::with_capacity(object.len());
        for (key, item) in object {
            let entry = match item {
                serde_json::Value::Null => continue,
                serde_json::Value::Object(_) => DefaultEntry::Nested(Arc::new(Self::from_json(item)?)),
                scalar => DefaultEntry::Value(value_from_json(key, scalar)?),
            };
            entries.insert(key.clone(), entry);
        }
        Ok(Self { entries })
    }
}

fn value_from_json(key: &str, json: &serde_json::Value) -> Result<Value, DefaultMapError> {
    match json {
        serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(Value::Int(i)),
            None => n.as_f64().map(Value::Float).ok_or(DefaultMapError::Unsupported {
                key: key.to_string(),
                kind: "number",
            }),
        },
        serde_json::Value::String(s) => Ok(Value::Str(s.clone())),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| value_from_json(key, item))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Tuple),
        other => Err(DefaultMapError::Unsupported {
            key: key.to_string(),
            kind: json_kind(other),
        }),
    }
}

fn json_kind(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

impl<'de> Deserialize<'de> for DefaultMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Self::from_json(&json).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    #[test]
    fn json_nests_by_command_name() {
        let map: DefaultMap = serde_json::from_str(
            r#"{"verbose": true, "greet": {"count": 3, "names": ["a", "b"], "skip": null}}"#,
        )
        .unwrap();
        assert_eq!(map.lookup("verbose"), Some(Value::Bool(true)));
        assert_eq!(map.lookup("greet"), None);

        let greet = map.for_command("greet").unwrap();
        assert_eq!(greet.lookup("count"), Some(Value::Int(3)));
        assert_eq!(greet.lookup("names"), Some(Value::from(vec!["a", "b"])));
        assert!(greet.get("skip").is_none());
        assert!(map.for_command("verbose").is_none());
    }

    #[test]
    fn rejects_non_objects() {
        let err = DefaultMap::from_json(&serde_json::json!([1, 2])).unwrap_err();
        assert_eq!(err, DefaultMapError::NotAnObject("array"));
        let err = DefaultMap::from_json(&serde_json::json!({"x": [{"y": 1}]})).unwrap_err();
        assert_eq!(
            err,
            DefaultMapError::Unsupported {
                key: "x".to_string(),
                kind: "object"
            }
        );
    }

    #[test]
    fn producers_run_per_lookup() {
        let calls = Arc::new(AtomicI64::new(0));
        let counter = Arc::clone(&calls);
        let map = DefaultMap::new().with_producer("n", move || {
            Value::Int(counter.fetch_add(1, Ordering::SeqCst) + 1)
        });
        assert_eq!(map.lookup("n"), Some(Value::Int(1)));
        assert_eq!(map.lookup("n"), Some(Value::Int(2)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
