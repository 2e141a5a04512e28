//! Validation and derivation of the kernel configuration.

use super::env::{EnvSource, ProcessEnv};
use super::raw::RawConfig;
use crate::error::{KernelError, KernelResult};
use serde_json::Value;
use std::fmt;
use std::num::NonZeroUsize;
use tracing::debug;
use url::Url;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_DATA_STORE_URL: &str = "mongodb://localhost/kernel_dev";
pub const DEFAULT_CACHE_URL: &str = "redis://localhost:6379";
pub const DEFAULT_ENVIRONMENT: &str = "development";
pub const MIN_SECRET_LEN: usize = 9;

const HOST_SCHEMES: &[&str] = &["http", "https"];
const DATA_STORE_SCHEMES: &[&str] = &["mongodb", "mongodb+srv", "memory"];
const CACHE_SCHEMES: &[&str] = &["redis", "rediss", "memory"];

const DATA_STORE_ENV: &[&str] = &["MONGO_URL", "MONGOLAB_URI", "MONGOHQ_URL"];
const CACHE_ENV: &[&str] = &["REDIS_URL", "REDISCLOUD_URL", "REDISTOGO_URL"];

/// Normalized, immutable kernel configuration.
///
/// URL fields keep the exact text they were given; validation parses them
/// but never rewrites a value that was already valid.
#[derive(Clone)]
pub struct KernelConfig {
    host_url: String,
    host: String,
    secret: String,
    data_store_url: String,
    cache_url: String,
    port: u16,
    environment: String,
    limit_workers: Option<NonZeroUsize>,
    extra: serde_json::Map<String, Value>,
}

impl KernelConfig {
    /// Normalize against the process environment.
    pub fn from_raw(raw: RawConfig) -> KernelResult<Self> {
        Self::normalize(raw, &ProcessEnv)
    }

    /// Normalize a raw configuration, deriving omitted fields from `env`.
    pub fn normalize(raw: RawConfig, env: &impl EnvSource) -> KernelResult<Self> {
        // The host default embeds the port, but a bad PORT is only reported
        // after the four core fields.
        let port = resolve_port(raw.port, env);
        let default_port = port.as_ref().copied().unwrap_or(DEFAULT_PORT);

        let host_url = raw
            .host_url
            .or_else(|| env.var("HOST_URL"))
            .unwrap_or_else(|| format!("http://localhost:{default_port}/"));
        let host = validate_host(&host_url)?;

        let secret = raw
            .secret
            .or_else(|| env.var("SECRET"))
            .ok_or_else(|| KernelError::config("secret", "is not set"))?;
        if secret.chars().count() < MIN_SECRET_LEN {
            return Err(KernelError::config(
                "secret",
                format!("is too short, at least {MIN_SECRET_LEN} characters required"),
            ));
        }

        let data_store_url = raw
            .data_store_url
            .or_else(|| env.first_of(DATA_STORE_ENV))
            .unwrap_or_else(|| DEFAULT_DATA_STORE_URL.to_string());
        validate_url("dataStoreUrl", &data_store_url, DATA_STORE_SCHEMES)?;

        let cache_url = raw
            .cache
            .map(|c| c.to_url())
            .or_else(|| env.first_of(CACHE_ENV))
            .unwrap_or_else(|| DEFAULT_CACHE_URL.to_string());
        validate_url("cache", &cache_url, CACHE_SCHEMES)?;

        let port = port?;

        let environment = raw
            .environment
            .or_else(|| env.var("KERNEL_ENV"))
            .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string());
        if environment.is_empty() || environment.chars().any(char::is_whitespace) {
            return Err(KernelError::config(
                "environment",
                "must be a non-empty name without whitespace",
            ));
        }

        let limit_workers = raw
            .limit_workers
            .filter(|limit| *limit > 0)
            .and_then(|limit| usize::try_from(limit).ok())
            .and_then(NonZeroUsize::new);

        let config = Self {
            host_url,
            host,
            secret,
            data_store_url,
            cache_url,
            port,
            environment,
            limit_workers,
            extra: raw.extra,
        };
        debug!(config = ?config, "Configuration normalized");
        Ok(config)
    }

    pub fn host_url(&self) -> &str {
        &self.host_url
    }

    /// Host name parsed from the host URL.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn data_store_url(&self) -> &str {
        &self.data_store_url
    }

    pub fn cache_url(&self) -> &str {
        &self.cache_url
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Upper bound on cluster workers; `None` means one per CPU.
    pub fn limit_workers(&self) -> Option<NonZeroUsize> {
        self.limit_workers
    }

    /// Plugin-specific setting that the kernel does not interpret.
    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}

impl fmt::Debug for KernelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelConfig")
            .field("host_url", &self.host_url)
            .field("secret", &"<redacted>")
            .field("data_store_url", &self.data_store_url)
            .field("cache_url", &self.cache_url)
            .field("port", &self.port)
            .field("environment", &self.environment)
            .field("limit_workers", &self.limit_workers)
            .field("extra", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn resolve_port(explicit: Option<u16>, env: &impl EnvSource) -> KernelResult<u16> {
    match explicit {
        Some(port) => Ok(port),
        None => match env.var("PORT") {
            Some(value) => value
                .parse::<u16>()
                .map_err(|_| KernelError::config("port", format!("'{value}' is not a valid port"))),
            None => Ok(DEFAULT_PORT),
        },
    }
}

fn validate_host(host_url: &str) -> KernelResult<String> {
    let parsed = validate_url("hostUrl", host_url, HOST_SCHEMES)?;
    match parsed.host_str() {
        Some(host) if !host.is_empty() => Ok(host.to_string()),
        _ => Err(KernelError::config(
            "hostUrl",
            format!("'{host_url}' has no host name"),
        )),
    }
}

fn validate_url(field: &'static str, value: &str, schemes: &[&str]) -> KernelResult<Url> {
    let parsed = Url::parse(value)
        .map_err(|e| KernelError::config(field, format!("'{value}' is not a valid URL: {e}")))?;
    if !schemes.contains(&parsed.scheme()) {
        return Err(KernelError::config(
            field,
            format!(
                "scheme '{}' is not supported, expected one of {}",
                parsed.scheme(),
                schemes.join(", ")
            ),
        ));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheLocation;
    use std::collections::HashMap;

    fn no_env() -> HashMap<&'static str, &'static str> {
        HashMap::new()
    }

    fn valid() -> RawConfig {
        RawConfig::new().with_secret("correct horse battery")
    }

    fn field_of(err: KernelError) -> &'static str {
        match err {
            KernelError::Configuration { field, .. } => field,
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn test_defaults() {
        let config = KernelConfig::normalize(valid(), &no_env()).unwrap();

        assert_eq!(config.host_url(), "http://localhost:3000/");
        assert_eq!(config.host(), "localhost");
        assert_eq!(config.data_store_url(), DEFAULT_DATA_STORE_URL);
        assert_eq!(config.cache_url(), DEFAULT_CACHE_URL);
        assert_eq!(config.port(), 3000);
        assert_eq!(config.environment(), "development");
        assert_eq!(config.limit_workers(), None);
    }

    #[test]
    fn test_derived_from_env() {
        let env = HashMap::from([
            ("HOST_URL", "https://kernel.example.org/"),
            ("SECRET", "from-the-environment"),
            ("MONGOLAB_URI", "mongodb://lab/db"),
            ("REDISCLOUD_URL", "redis://cloud:6379"),
            ("PORT", "8080"),
            ("KERNEL_ENV", "staging"),
        ]);
        let config = KernelConfig::normalize(RawConfig::new(), &env).unwrap();

        assert_eq!(config.host_url(), "https://kernel.example.org/");
        assert_eq!(config.secret(), "from-the-environment");
        assert_eq!(config.data_store_url(), "mongodb://lab/db");
        assert_eq!(config.cache_url(), "redis://cloud:6379");
        assert_eq!(config.port(), 8080);
        assert_eq!(config.environment(), "staging");
    }

    #[test]
    fn test_explicit_values_win_over_env() {
        let env = HashMap::from([("SECRET", "from-the-environment"), ("PORT", "8080")]);
        let config = KernelConfig::normalize(valid().with_port(4000), &env).unwrap();

        assert_eq!(config.secret(), "correct horse battery");
        assert_eq!(config.port(), 4000);
        assert_eq!(config.host_url(), "http://localhost:4000/");
    }

    #[test]
    fn test_valid_values_are_not_rewritten() {
        let config = KernelConfig::normalize(
            valid().with_host_url("http://example.org"),
            &no_env(),
        )
        .unwrap();
        assert_eq!(config.host_url(), "http://example.org");
    }

    #[test]
    fn test_validation_order() {
        let everything_wrong = RawConfig::new()
            .with_host_url("not a url")
            .with_secret("short")
            .with_data_store_url("postgres://db")
            .with_cache_url("memcached://cache");

        let err = KernelConfig::normalize(everything_wrong.clone(), &no_env()).unwrap_err();
        assert_eq!(field_of(err), "hostUrl");

        let raw = everything_wrong.with_host_url("http://example.org/");
        let err = KernelConfig::normalize(raw.clone(), &no_env()).unwrap_err();
        assert_eq!(field_of(err), "secret");

        let raw = raw.with_secret("long enough now");
        let err = KernelConfig::normalize(raw.clone(), &no_env()).unwrap_err();
        assert_eq!(field_of(err), "dataStoreUrl");

        let raw = raw.with_data_store_url("memory://");
        let err = KernelConfig::normalize(raw, &no_env()).unwrap_err();
        assert_eq!(field_of(err), "cache");
    }

    #[test]
    fn test_missing_secret() {
        let err = KernelConfig::normalize(RawConfig::new(), &no_env()).unwrap_err();
        assert_eq!(field_of(err), "secret");
    }

    #[test]
    fn test_secret_length_boundary() {
        assert!(KernelConfig::normalize(RawConfig::new().with_secret("12345678"), &no_env()).is_err());
        assert!(KernelConfig::normalize(RawConfig::new().with_secret("123456789"), &no_env()).is_ok());
    }

    #[test]
    fn test_host_without_hostname_is_rejected() {
        let err =
            KernelConfig::normalize(valid().with_host_url("mailto:someone"), &no_env()).unwrap_err();
        assert_eq!(field_of(err), "hostUrl");
    }

    #[test]
    fn test_bad_port_reported_after_core_fields() {
        let env = HashMap::from([("PORT", "eighty")]);
        let err = KernelConfig::normalize(RawConfig::new(), &env).unwrap_err();
        assert_eq!(field_of(err), "secret");

        let err = KernelConfig::normalize(valid(), &env).unwrap_err();
        assert_eq!(field_of(err), "port");
    }

    #[test]
    fn test_cache_parts_are_rendered() {
        let raw = valid().with_cache(CacheLocation::Parts {
            host: "cache.internal".into(),
            port: Some(6380),
            auth: None,
        });
        let config = KernelConfig::normalize(raw, &no_env()).unwrap();
        assert_eq!(config.cache_url(), "redis://cache.internal:6380");
    }

    #[test]
    fn test_non_positive_worker_limit_is_absent() {
        for limit in [0, -3] {
            let config =
                KernelConfig::normalize(valid().with_limit_workers(limit), &no_env()).unwrap();
            assert_eq!(config.limit_workers(), None);
        }
        let config = KernelConfig::normalize(valid().with_limit_workers(2), &no_env()).unwrap();
        assert_eq!(config.limit_workers().map(NonZeroUsize::get), Some(2));
    }

    #[test]
    fn test_environment_name_validation() {
        let err =
            KernelConfig::normalize(valid().with_environment("dev elopment"), &no_env()).unwrap_err();
        assert_eq!(field_of(err), "environment");
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = KernelConfig::normalize(valid(), &no_env()).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("correct horse battery"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_extra_settings_pass_through() {
        let raw = valid().with_extra("analytics", serde_json::json!({"key": "abc"}));
        let config = KernelConfig::normalize(raw, &no_env()).unwrap();
        assert_eq!(config.extra("analytics").unwrap()["key"], "abc");
        assert!(config.extra("missing").is_none());
    }
}
