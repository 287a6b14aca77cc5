//! Configuration management
//!
//! Knobs are read once at construction and immutable thereafter. The only
//! hidden global honored anywhere in this crate is the `IDEMPOTENCY_DISABLED`
//! kill switch (§4.6) — everything else flows through an explicit [`Config`]
//! passed to the middleware constructor.

use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::key::HashFunction;
use crate::{Error, Result};

/// Environment variable that, when set to `"true"`, bypasses the middleware
/// entirely: the user function runs on every invocation and no rows are
/// written or read.
pub const DISABLED_ENV_VAR: &str = "IDEMPOTENCY_DISABLED";

/// Default DynamoDB-style table name, used when `TABLE_NAME` is unset.
pub const DEFAULT_TABLE_NAME: &str = "idempotency";

/// `true` when the kill switch is engaged for the current process.
#[must_use]
pub fn is_disabled() -> bool {
    std::env::var(DISABLED_ENV_VAR)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Top-level configuration: idempotency knobs, store column mapping, and
/// logging setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Idempotency protocol knobs (§3 `IdempotencyConfig`).
    pub idempotency: IdempotencyConfig,
    /// Physical store configuration (table name, column mapping).
    pub store: StoreConfig,
    /// Structured-logging setup.
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            idempotency: IdempotencyConfig::default(),
            store: StoreConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from an optional YAML file merged with
    /// `IDEMPOTENCY_`-prefixed environment variables (`__` nesting
    /// separator), then validate it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationError`] if the file is missing, the
    /// merged document fails to parse, or [`Self::validate`] rejects it.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        // Best-effort: a missing .env file is the common case outside local dev.
        let _ = dotenvy::dotenv();

        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::ConfigurationError(format!(
                    "config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed("IDEMPOTENCY_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::ConfigurationError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that can never behave sensibly.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationError`] when the key selector is empty,
    /// or either duration knob is non-positive.
    pub fn validate(&self) -> Result<()> {
        self.idempotency.validate()
    }
}

/// Idempotency protocol configuration (`IdempotencyConfig` in the data
/// model).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdempotencyConfig {
    /// Selector expression picking the subtree used to derive the
    /// idempotency key. Required — empty is rejected by [`Config::validate`].
    pub event_key_selector: String,
    /// Selector expression picking the payload-validation subtree. `None`
    /// disables payload validation.
    pub payload_validation_selector: Option<String>,
    /// Retention of a `COMPLETED` row before the backend's TTL sweep reclaims
    /// it.
    #[serde(with = "humantime_serde")]
    pub record_ttl: Duration,
    /// In-progress lease length: how long a single execution may hold a row
    /// before another caller's `put` may take over.
    #[serde(with = "humantime_serde")]
    pub execution_timeout: Duration,
    /// Enable the process-local bounded LRU (§4.4).
    pub use_local_cache: bool,
    /// Bound on the local cache's entry count.
    pub local_cache_max_items: usize,
    /// Fail with `KeyExtractionFailed` (`true`) vs. silently bypass the
    /// middleware (`false`) when the key selector produces no value.
    pub raise_on_no_idempotency_key: bool,
    /// Digest algorithm for key and validation hashes.
    pub hash_function: HashFunction,
    /// Logical name of the wrapped function, used as the first segment of
    /// the stored key.
    pub function_name: String,
    /// Optional extra namespace segment inserted before `function_name` in
    /// the stored key (e.g. per-tenant isolation).
    pub key_prefix: Option<String>,
    /// Deadline applied to each individual store call (`put`/`get`/`update`/
    /// `delete`), bounding how long the handler waits on a slow backend
    /// before failing with `PersistenceLayerError`.
    #[serde(with = "humantime_serde")]
    pub store_call_timeout: Duration,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            event_key_selector: String::new(),
            payload_validation_selector: None,
            record_ttl: Duration::from_secs(3600),
            execution_timeout: Duration::from_secs(30),
            use_local_cache: false,
            local_cache_max_items: crate::cache::DEFAULT_MAX_ITEMS,
            raise_on_no_idempotency_key: false,
            hash_function: HashFunction::default(),
            function_name: String::new(),
            key_prefix: None,
            store_call_timeout: Duration::from_secs(5),
        }
    }
}

impl IdempotencyConfig {
    /// Reject configurations that can never behave sensibly.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationError`] when the key selector or
    /// function name is empty, or either duration knob is non-positive.
    pub fn validate(&self) -> Result<()> {
        if self.event_key_selector.trim().is_empty() {
            return Err(Error::ConfigurationError(
                "event_key_selector must not be empty".to_string(),
            ));
        }
        if self.function_name.trim().is_empty() {
            return Err(Error::ConfigurationError(
                "function_name must not be empty".to_string(),
            ));
        }
        if self.record_ttl.as_secs() == 0 {
            return Err(Error::ConfigurationError(
                "record_ttl must be at least one second (it is truncated to whole seconds)"
                    .to_string(),
            ));
        }
        if self.execution_timeout.as_secs() == 0 {
            return Err(Error::ConfigurationError(
                "execution_timeout must be at least one second (it is truncated to whole seconds)"
                    .to_string(),
            ));
        }
        if self.store_call_timeout.is_zero() {
            return Err(Error::ConfigurationError(
                "store_call_timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Physical layout of the persistence row (column mapping, §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Table name. Falls back to the `TABLE_NAME` environment variable, then
    /// [`DEFAULT_TABLE_NAME`], when left empty.
    pub table_name: String,
    /// Column mapping and optional composite-key layout.
    pub columns: ColumnMapping,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            table_name: String::new(),
            columns: ColumnMapping::default(),
        }
    }
}

impl StoreConfig {
    /// Resolve the effective table name: explicit config, then `TABLE_NAME`,
    /// then [`DEFAULT_TABLE_NAME`].
    #[must_use]
    pub fn resolved_table_name(&self) -> String {
        if !self.table_name.is_empty() {
            return self.table_name.clone();
        }
        std::env::var("TABLE_NAME").unwrap_or_else(|_| DEFAULT_TABLE_NAME.to_string())
    }
}

/// Logical-to-physical column name mapping for the hosted NoSQL store.
///
/// Supports an optional composite-key layout where `partition_key` is a
/// static literal shared by every row and `sort_key` holds the idempotency
/// key, instead of the default single-partition-key layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMapping {
    /// Physical name of the partition key column. Default: `id`.
    pub partition_key: String,
    /// Physical name of the sort key column, when composite-key mode is
    /// enabled via [`Self::static_partition_value`].
    pub sort_key: String,
    /// When set, `partition_key` is written as this static literal on every
    /// row and the idempotency key is stored in `sort_key` instead.
    pub static_partition_value: Option<String>,
    /// Physical name of the status column. Default: `status`.
    pub status: String,
    /// Physical name of the TTL (seconds) column. Default: `expiration`.
    pub expiration: String,
    /// Physical name of the in-progress lease (ms) column. Default:
    /// `in_progress_expiration`.
    pub in_progress_expiration: String,
    /// Physical name of the response payload column. Default: `data`.
    pub data: String,
    /// Physical name of the payload-validation hash column. Default:
    /// `validation`.
    pub validation: String,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            partition_key: "id".to_string(),
            sort_key: "sort_key".to_string(),
            static_partition_value: None,
            status: "status".to_string(),
            expiration: "expiration".to_string(),
            in_progress_expiration: "in_progress_expiration".to_string(),
            data: "data".to_string(),
            validation: "validation".to_string(),
        }
    }
}

/// Structured-logging setup, mirroring the rest of the ambient stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing`/`EnvFilter`-compatible level string, e.g. `"info"`.
    pub level: String,
    /// `"json"` for machine-readable output, anything else for human text.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}
