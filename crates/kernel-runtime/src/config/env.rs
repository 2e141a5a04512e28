//! Sources for derived configuration values.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

/// Where omitted configuration fields are derived from.
pub trait EnvSource {
    /// Look up a variable. Empty values count as absent.
    fn var(&self, key: &str) -> Option<String>;

    /// First non-empty variable among `keys`.
    fn first_of(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| self.var(key))
    }
}

/// The process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    }
}

impl<K, V> EnvSource for HashMap<K, V>
where
    K: Borrow<str> + Eq + Hash,
    V: AsRef<str>,
{
    fn var(&self, key: &str) -> Option<String> {
        self.get(key)
            .map(|v| v.as_ref().to_string())
            .filter(|v| !v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_source_ignores_empty_values() {
        let env = HashMap::from([("SECRET", ""), ("PORT", "8080")]);
        assert_eq!(env.var("SECRET"), None);
        assert_eq!(env.var("PORT").as_deref(), Some("8080"));
    }

    #[test]
    fn test_first_of_respects_key_order() {
        let env = HashMap::from([("MONGOHQ_URL", "mongodb://hq/db"), ("MONGO_URL", "mongodb://a/db")]);
        assert_eq!(
            env.first_of(&["MONGO_URL", "MONGOLAB_URI", "MONGOHQ_URL"]).as_deref(),
            Some("mongodb://a/db")
        );
        assert_eq!(
            env.first_of(&["MONGOLAB_URI", "MONGOHQ_URL"]).as_deref(),
            Some("mongodb://hq/db")
        );
    }
}
