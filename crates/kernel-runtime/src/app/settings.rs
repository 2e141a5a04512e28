//! Application settings contributed by plugins.

use indexmap::IndexMap;
use serde_json::Value;

/// Key/value settings of the web application, scoped to one environment.
#[derive(Debug, Clone, PartialEq)]
pub struct AppSettings {
    environment: String,
    values: IndexMap<String, Value>,
}

impl AppSettings {
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            values: IndexMap::new(),
        }
    }

    /// The active environment these settings were built for.
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Set `key`, returning the value it replaced.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(key.into(), value.into())
    }

    /// Set `key` only if no value is present. Returns whether it was set.
    pub fn set_default(&mut self, key: impl Into<String>, value: impl Into<Value>) -> bool {
        let key = key.into();
        if self.values.contains_key(&key) {
            return false;
        }
        self.values.insert(key, value.into());
        true
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_overwrites() {
        let mut settings = AppSettings::new("development");
        assert_eq!(settings.set("views", "a"), None);
        assert_eq!(settings.set("views", "b"), Some(json!("a")));
        assert_eq!(settings.get("views"), Some(&json!("b")));
    }

    #[test]
    fn test_set_default_only_fills_empty_slot() {
        let mut settings = AppSettings::new("development");
        assert!(settings.set_default("port", 3000));
        assert!(!settings.set_default("port", 8080));
        assert_eq!(settings.get("port"), Some(&json!(3000)));
    }
}
