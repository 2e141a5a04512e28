//! The inbound, unvalidated configuration.

use crate::error::{KernelError, KernelResult};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

/// Cache location: a URL or its parts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CacheLocation {
    Url(String),
    Parts {
        host: String,
        port: Option<u16>,
        auth: Option<String>,
    },
}

impl CacheLocation {
    /// Render as a `redis://` URL.
    pub fn to_url(&self) -> String {
        match self {
            Self::Url(url) => url.clone(),
            Self::Parts { host, port, auth } => {
                let port = port.unwrap_or(6379);
                match auth {
                    Some(auth) if !auth.is_empty() => format!("redis://:{auth}@{host}:{port}"),
                    _ => format!("redis://{host}:{port}"),
                }
            }
        }
    }
}

/// Configuration as supplied by the operator.
///
/// Every field is optional; [`crate::config::KernelConfig::normalize`]
/// derives or defaults what is missing and rejects what is invalid. Keys that
/// are not recognized are kept in `extra` for plugins to read.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawConfig {
    pub host_url: Option<String>,
    pub secret: Option<String>,
    #[serde(alias = "mongoUrl")]
    pub data_store_url: Option<String>,
    #[serde(alias = "redis")]
    pub cache: Option<CacheLocation>,
    pub port: Option<u16>,
    pub environment: Option<String>,
    pub limit_workers: Option<i64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl RawConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document.
    pub fn from_toml_str(source: &str) -> KernelResult<Self> {
        toml::from_str(source).map_err(|e| KernelError::config("file", e.to_string()))
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> KernelResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| KernelError::config("file", format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    pub fn with_host_url(mut self, url: impl Into<String>) -> Self {
        self.host_url = Some(url.into());
        self
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn with_data_store_url(mut self, url: impl Into<String>) -> Self {
        self.data_store_url = Some(url.into());
        self
    }

    pub fn with_cache(mut self, cache: CacheLocation) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_cache_url(self, url: impl Into<String>) -> Self {
        self.with_cache(CacheLocation::Url(url.into()))
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn with_limit_workers(mut self, limit: i64) -> Self {
        self.limit_workers = Some(limit);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_camel_case_and_aliases() {
        let raw = RawConfig::from_toml_str(
            r#"
            hostUrl = "https://example.org/"
            secret = "long enough secret"
            mongoUrl = "mongodb://db.internal/app"
            redis = { host = "cache.internal", port = 6380, auth = "pw" }
            limitWorkers = 2
            analytics = { key = "abc" }
            "#,
        )
        .unwrap();

        assert_eq!(raw.host_url.as_deref(), Some("https://example.org/"));
        assert_eq!(raw.data_store_url.as_deref(), Some("mongodb://db.internal/app"));
        assert_eq!(
            raw.cache.as_ref().map(CacheLocation::to_url).as_deref(),
            Some("redis://:pw@cache.internal:6380")
        );
        assert_eq!(raw.limit_workers, Some(2));
        assert_eq!(raw.extra["analytics"]["key"], "abc");
    }

    #[test]
    fn test_cache_url_string_form() {
        let raw = RawConfig::from_toml_str(r#"cache = "redis://localhost:6379""#).unwrap();
        assert_eq!(
            raw.cache,
            Some(CacheLocation::Url("redis://localhost:6379".into()))
        );
    }

    #[test]
    fn test_cache_parts_default_port() {
        let parts = CacheLocation::Parts {
            host: "localhost".into(),
            port: None,
            auth: None,
        };
        assert_eq!(parts.to_url(), "redis://localhost:6379");
    }

    #[test]
    fn test_malformed_toml_is_a_configuration_error() {
        let err = RawConfig::from_toml_str("hostUrl = ").unwrap_err();
        assert!(matches!(err, KernelError::Configuration { field: "file", .. }));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kernel.toml");
        std::fs::write(&path, "secret = \"from a file!\"\nport = 8080\n").unwrap();

        let raw = RawConfig::from_file(&path).unwrap();
        assert_eq!(raw.secret.as_deref(), Some("from a file!"));
        assert_eq!(raw.port, Some(8080));
    }

    #[test]
    fn test_missing_file() {
        let err = RawConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, KernelError::Configuration { field: "file", .. }));
    }
}
