//! Local bindings shared between the host and a single script run.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The local bindings of one script run.
///
/// A fresh scope is created for every run. The pre-hook populates it with
/// arguments before the script executes, the script reads and writes it, and
/// the post-hook reads results out of it afterwards. This is the only data
/// surface between host and script.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptScope {
    bindings: HashMap<String, Value>,
}

impl ScriptScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `value`, replacing any previous binding.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.bindings.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.bindings.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.bindings.iter().map(|(name, value)| (name.as_str(), value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_and_get() {
        let mut scope = ScriptScope::new();
        assert!(scope.is_empty());

        scope.set("count", 3);
        scope.set("name", "run-a");
        scope.set("flags", json!({ "dry": true }));

        assert_eq!(scope.get("count"), Some(&json!(3)));
        assert_eq!(scope.get("name"), Some(&json!("run-a")));
        assert!(scope.contains("flags"));
        assert_eq!(scope.len(), 3);
    }

    #[test]
    fn test_set_replaces_binding() {
        let mut scope = ScriptScope::new();
        scope.set("n", 1);
        scope.set("n", 2);
        assert_eq!(scope.get("n"), Some(&json!(2)));
        assert_eq!(scope.len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut scope = ScriptScope::new();
        scope.set("n", 1);
        assert_eq!(scope.remove("n"), Some(json!(1)));
        assert_eq!(scope.remove("n"), None);
        assert!(!scope.contains("n"));
    }
}
