use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{Map, Value};

/// Run-scoped variable scope shared by every engine of a run.
///
/// Cloning is cheap and yields a handle to the same scope. Scripts never see this type;
/// they get a [`snapshot`](Vars::snapshot).
#[derive(Debug, Clone, Default)]
pub struct Vars(Arc<DashMap<String, Value>>);

impl Vars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.get(key).map(|entry| entry.value().clone())
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.0.remove(key).map(|(_, value)| value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Mutate one entry in place. `None` when the key is absent.
    ///
    /// Holds the entry's shard lock for the duration of `f`; do not touch the scope from
    /// inside it.
    pub fn update<R>(&self, key: &str, f: impl FnOnce(&mut Value) -> R) -> Option<R> {
        self.0.get_mut(key).map(|mut entry| f(entry.value_mut()))
    }

    /// Point-in-time copy of the whole scope.
    pub fn snapshot(&self) -> Map<String, Value> {
        self.0
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

impl From<Map<String, Value>> for Vars {
    fn from(map: Map<String, Value>) -> Self {
        let vars = Vars::new();
        for (key, value) in map {
            vars.set(key, value);
        }
        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clones_share_the_same_scope() {
        let vars = Vars::new();
        let other = vars.clone();
        other.set("count", json!(1));
        assert_eq!(vars.get("count"), Some(json!(1)));
        assert_eq!(vars.len(), 1);
    }

    #[test]
    fn snapshot_is_detached() {
        let vars = Vars::new();
        vars.set("list", json!([1]));
        let snapshot = vars.snapshot();
        vars.update("list", |v| {
            if let Value::Array(items) = v {
                items.push(json!(2));
            }
        });
        assert_eq!(snapshot["list"], json!([1]));
        assert_eq!(vars.get("list"), Some(json!([1, 2])));
    }

    #[test]
    fn update_on_missing_key_is_none() {
        let vars = Vars::new();
        assert_eq!(vars.update("nope", |_| ()), None);
        assert!(!vars.contains("nope"));
    }
}
