//! # Shared Namespace Tree
//!
//! Core extensions are injected here during materialization, keyed by
//! `(namespace, field)`. A slot is written at most once.

use crate::error::{KernelError, KernelResult};
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Namespace used when a contribution does not name one.
pub const DEFAULT_NAMESPACE: &str = "shared";

/// Error returned by a shared function.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct SharedCallError(pub String);

impl SharedCallError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A callable core extension.
pub type SharedFn = Arc<dyn Fn(&[Value]) -> Result<Value, SharedCallError> + Send + Sync>;

/// Value stored in a shared slot.
#[derive(Clone)]
pub enum SharedValue {
    Data(Value),
    Function(SharedFn),
}

impl SharedValue {
    pub fn data(value: impl Into<Value>) -> Self {
        Self::Data(value.into())
    }

    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, SharedCallError> + Send + Sync + 'static,
    {
        Self::Function(Arc::new(f))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Data(_) => "data",
            Self::Function(_) => "function",
        }
    }
}

impl fmt::Debug for SharedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data(value) => f.debug_tuple("Data").field(value).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
        }
    }
}

impl From<Value> for SharedValue {
    fn from(value: Value) -> Self {
        Self::Data(value)
    }
}

/// Failures of the typed accessors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SharedAccessError {
    #[error("Namespace '{0}' does not exist")]
    MissingNamespace(String),

    #[error("Namespace '{namespace}' has no field '{field}'")]
    MissingField { namespace: String, field: String },

    #[error("'{namespace}.{field}' is {found}, expected {expected}")]
    WrongKind {
        namespace: String,
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("'{namespace}.{field}' failed: {source}")]
    Call {
        namespace: String,
        field: String,
        #[source]
        source: SharedCallError,
    },
}

/// Mapping of namespace → field → value, in injection order.
#[derive(Debug, Clone, Default)]
pub struct SharedNamespaces {
    namespaces: IndexMap<String, IndexMap<String, SharedValue>>,
}

impl SharedNamespaces {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a slot. An occupied slot is a collision, never an overwrite.
    pub fn insert(
        &mut self,
        namespace: &str,
        field: &str,
        value: SharedValue,
    ) -> KernelResult<()> {
        let fields = self.namespaces.entry(namespace.to_string()).or_default();
        if fields.contains_key(field) {
            return Err(KernelError::NamespaceCollision {
                namespace: namespace.to_string(),
                field: field.to_string(),
            });
        }
        fields.insert(field.to_string(), value);
        Ok(())
    }

    pub fn get(&self, namespace: &str, field: &str) -> Result<&SharedValue, SharedAccessError> {
        self.namespaces
            .get(namespace)
            .ok_or_else(|| SharedAccessError::MissingNamespace(namespace.to_string()))?
            .get(field)
            .ok_or_else(|| SharedAccessError::MissingField {
                namespace: namespace.to_string(),
                field: field.to_string(),
            })
    }

    /// Read a data slot.
    pub fn data(&self, namespace: &str, field: &str) -> Result<&Value, SharedAccessError> {
        match self.get(namespace, field)? {
            SharedValue::Data(value) => Ok(value),
            other => Err(wrong_kind(namespace, field, "data", other)),
        }
    }

    /// Invoke a function slot.
    pub fn call(
        &self,
        namespace: &str,
        field: &str,
        args: &[Value],
    ) -> Result<Value, SharedAccessError> {
        match self.get(namespace, field)? {
            SharedValue::Function(f) => f(args).map_err(|source| SharedAccessError::Call {
                namespace: namespace.to_string(),
                field: field.to_string(),
                source,
            }),
            other => Err(wrong_kind(namespace, field, "function", other)),
        }
    }

    pub fn namespace(&self, namespace: &str) -> Option<&IndexMap<String, SharedValue>> {
        self.namespaces.get(namespace)
    }

    pub fn contains(&self, namespace: &str, field: &str) -> bool {
        self.namespaces
            .get(namespace)
            .is_some_and(|fields| fields.contains_key(field))
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.namespaces.keys().map(String::as_str)
    }

    /// Total number of assigned slots.
    pub fn len(&self) -> usize {
        self.namespaces.values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn wrong_kind(
    namespace: &str,
    field: &str,
    expected: &'static str,
    found: &SharedValue,
) -> SharedAccessError {
    SharedAccessError::WrongKind {
        namespace: namespace.to_string(),
        field: field.to_string(),
        expected,
        found: found.kind(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sum() -> SharedValue {
        SharedValue::function(|args| {
            let total: i64 = args.iter().filter_map(Value::as_i64).sum();
            Ok(json!(total))
        })
    }

    #[test]
    fn test_insert_and_call() {
        let mut shared = SharedNamespaces::new();
        shared.insert(DEFAULT_NAMESPACE, "sum", sum()).unwrap();

        assert_eq!(
            shared.call("shared", "sum", &[json!(2), json!(2)]).unwrap(),
            json!(4)
        );
    }

    #[test]
    fn test_collision_keeps_first_value() {
        let mut shared = SharedNamespaces::new();
        shared.insert("shared", "answer", SharedValue::data(42)).unwrap();

        let err = shared
            .insert("shared", "answer", SharedValue::data(43))
            .unwrap_err();
        assert!(matches!(err, KernelError::NamespaceCollision { .. }));
        assert_eq!(shared.data("shared", "answer").unwrap(), &json!(42));
    }

    #[test]
    fn test_same_field_in_other_namespace() {
        let mut shared = SharedNamespaces::new();
        shared.insert("shared", "answer", SharedValue::data(1)).unwrap();
        shared.insert("billing", "answer", SharedValue::data(2)).unwrap();

        assert_eq!(shared.data("shared", "answer").unwrap(), &json!(1));
        assert_eq!(shared.data("billing", "answer").unwrap(), &json!(2));
        assert_eq!(shared.len(), 2);
        assert_eq!(shared.namespaces().collect::<Vec<_>>(), vec!["shared", "billing"]);
    }

    #[test]
    fn test_accessor_errors() {
        let mut shared = SharedNamespaces::new();
        shared.insert("shared", "sum", sum()).unwrap();
        shared.insert("shared", "name", SharedValue::data("kernel")).unwrap();

        assert_eq!(
            shared.get("nope", "sum").unwrap_err(),
            SharedAccessError::MissingNamespace("nope".into())
        );
        assert!(matches!(
            shared.get("shared", "nope"),
            Err(SharedAccessError::MissingField { .. })
        ));
        assert!(matches!(
            shared.data("shared", "sum"),
            Err(SharedAccessError::WrongKind { expected: "data", found: "function", .. })
        ));
        assert!(matches!(
            shared.call("shared", "name", &[]),
            Err(SharedAccessError::WrongKind { expected: "function", .. })
        ));
    }

    #[test]
    fn test_call_failure_is_wrapped() {
        let mut shared = SharedNamespaces::new();
        shared
            .insert(
                "shared",
                "fail",
                SharedValue::function(|_| Err(SharedCallError::new("boom"))),
            )
            .unwrap();

        let err = shared.call("shared", "fail", &[]).unwrap_err();
        assert!(err.to_string().contains("boom"));
    }
}
