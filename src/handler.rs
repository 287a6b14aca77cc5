//! The protocol orchestrator: wraps a user function and drives the
//! `NEW → INPROGRESS → COMPLETED|EXPIRED` state machine against a
//! [`PersistenceStore`].

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::LocalCache;
use crate::config::IdempotencyConfig;
use crate::error::{Error, Result};
use crate::key::{derive_key, hash_value};
use crate::record::{DataRecord, Status};
use crate::selector::{Selector, SelectorOutcome};
use crate::store::{PersistenceStore, PutOutcome};
use crate::time::{now_ms, now_secs};

/// Number of times [`IdempotencyHandler::call`] will loop back to `put` after
/// observing a logically-absent conflicting row, before giving up.
const MAX_STALE_RETRIES: u32 = 2;

/// Compiled, ready-to-use idempotency middleware for one logical function.
///
/// Construct once per process (warm-start reuse); cheap to clone, since the
/// store and cache are held behind `Arc`.
pub struct IdempotencyHandler<S> {
    config: IdempotencyConfig,
    store: Arc<S>,
    cache: Option<LocalCache>,
    key_selector: Selector,
    validation_selector: Option<Selector>,
}

impl<S: PersistenceStore> IdempotencyHandler<S> {
    /// Compile selectors and build a handler against `store`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationError`] if `config` fails validation or
    /// either selector expression fails to compile.
    pub fn new(config: IdempotencyConfig, store: S) -> Result<Self> {
        config.validate()?;
        let key_selector = Selector::compile(&config.event_key_selector)?;
        let validation_selector = config
            .payload_validation_selector
            .as_deref()
            .map(Selector::compile)
            .transpose()?;
        let cache = config
            .use_local_cache
            .then(|| LocalCache::new(config.local_cache_max_items));

        Ok(Self {
            config,
            store: Arc::new(store),
            cache,
            key_selector,
            validation_selector,
        })
    }

    fn derive_validation_hash(&self, event: &Value) -> Result<Option<String>> {
        let Some(selector) = &self.validation_selector else {
            return Ok(None);
        };
        match selector.evaluate(event)? {
            SelectorOutcome::Value(v) => Ok(Some(hash_value(&v, self.config.hash_function))),
            SelectorOutcome::Missing => Ok(None),
        }
    }

    fn check_validation(&self, record: &DataRecord, event: &Value) -> Result<()> {
        let Some(stored_hash) = &record.payload_hash else {
            return Ok(());
        };
        let current_hash = self.derive_validation_hash(event)?;
        if current_hash.as_deref() != Some(stored_hash.as_str()) {
            return Err(Error::PayloadValidationFailed);
        }
        Ok(())
    }

    fn decode_response(&self, record: &DataRecord) -> Result<Value> {
        let raw = record
            .response_data
            .as_deref()
            .ok_or_else(|| Error::persistence("COMPLETED row missing response_data"))?;
        Ok(serde_json::from_str(raw)?)
    }

    /// Bound a store call by `store_call_timeout`, turning a missed deadline
    /// into `PersistenceLayerError` rather than hanging the invocation.
    async fn with_timeout<T>(&self, op: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.config.store_call_timeout, op)
            .await
            .map_err(|_| Error::persistence("store call exceeded store_call_timeout"))?
    }

    /// Invoke `user_fn` with idempotency guarantees for `event`.
    ///
    /// `user_fn` is called at most once per live key (modulo the documented
    /// lease-expiry race, see §8 property 1). Returns the JSON-serialized
    /// result, either freshly produced or replayed from a prior completed
    /// invocation.
    ///
    /// # Errors
    ///
    /// - [`Error::KeyExtractionFailed`] if the key selector matches nothing
    ///   and `raise_on_no_idempotency_key` is set.
    /// - [`Error::PayloadValidationFailed`] on a validation-subtree mismatch.
    /// - [`Error::AlreadyInProgress`] if another live execution holds the lease.
    /// - [`Error::PersistenceLayerError`] on backend failure or retry exhaustion.
    /// - [`Error::HandlerFailed`] if `user_fn` itself fails (after best-effort
    ///   lease cleanup).
    pub async fn call<F, Fut, R>(&self, event: &Value, user_fn: F) -> Result<Value>
    where
        F: FnOnce(Value) -> Fut,
        Fut: Future<Output = std::result::Result<R, anyhow::Error>>,
        R: Serialize,
    {
        if crate::config::is_disabled() {
            debug!("idempotency disabled, running handler unconditionally");
            let value = user_fn(event.clone()).await.map_err(Error::HandlerFailed)?;
            return Ok(serde_json::to_value(value)?);
        }

        let key = match self.key_selector.evaluate(event)? {
            SelectorOutcome::Value(v) => {
                derive_key(
                    &self.config.function_name,
                    self.config.key_prefix.as_deref(),
                    &v,
                    self.config.hash_function,
                )
            }
            SelectorOutcome::Missing if self.config.raise_on_no_idempotency_key => {
                return Err(Error::KeyExtractionFailed(
                    self.key_selector.source().to_string(),
                ));
            }
            SelectorOutcome::Missing => {
                debug!("no idempotency key extracted, bypassing middleware");
                let value = user_fn(event.clone()).await.map_err(Error::HandlerFailed)?;
                return Ok(serde_json::to_value(value)?);
            }
        };

        // Step 1: local cache fast path.
        if let Some(cache) = &self.cache {
            if let Some(record) = cache.get(&key) {
                self.check_validation(&record, event)?;
                return self.decode_response(&record);
            }
        }

        let payload_hash = self.derive_validation_hash(event)?;
        self.resolve(&key, event, payload_hash, user_fn, 0).await
    }

    async fn resolve<F, Fut, R>(
        &self,
        key: &str,
        event: &Value,
        payload_hash: Option<String>,
        user_fn: F,
        attempt: u32,
    ) -> Result<Value>
    where
        F: FnOnce(Value) -> Fut,
        Fut: Future<Output = std::result::Result<R, anyhow::Error>>,
        R: Serialize,
    {
        let (secs, ms) = (now_secs(), now_ms());
        let record = DataRecord::new_in_progress(
            key.to_string(),
            secs,
            ms,
            self.config.record_ttl.as_secs(),
            self.config.execution_timeout.as_secs(),
            payload_hash.clone(),
        );

        match self.with_timeout(self.store.put(&record)).await? {
            PutOutcome::Inserted => {
                debug!(key, "put succeeded, executing user function");
                self.execute(key, event, record, user_fn).await
            }
            PutOutcome::AlreadyExists => {
                debug!(key, "put conflict, resolving existing row");
                let existing = self
                    .with_timeout(self.store.get(key))
                    .await?
                    .ok_or_else(|| Error::persistence("conflicting row vanished between put and get"))?;

                if existing.is_logically_absent(secs, ms) {
                    if attempt >= MAX_STALE_RETRIES {
                        return Err(Error::persistence(
                            "exhausted retries resolving a stale conflicting row",
                        ));
                    }
                    warn!(key, attempt, "stale conflicting row, retaking lease");
                    return Box::pin(self.resolve(key, event, payload_hash, user_fn, attempt + 1)).await;
                }

                match existing.effective_status(secs) {
                    Status::Completed => {
                        self.check_validation(&existing, event)?;
                        if let Some(cache) = &self.cache {
                            cache.put(existing.clone());
                        }
                        self.decode_response(&existing)
                    }
                    Status::InProgress => {
                        let lease = existing.in_progress_expiry_ms.unwrap_or(0);
                        warn!(key, lease, "duplicate against a live lease");
                        Err(Error::AlreadyInProgress(lease))
                    }
                    Status::Expired => Err(Error::persistence(
                        "row reported expired status but was not logically absent",
                    )),
                }
            }
        }
    }

    async fn execute<F, Fut, R>(
        &self,
        key: &str,
        event: &Value,
        mut record: DataRecord,
        user_fn: F,
    ) -> Result<Value>
    where
        F: FnOnce(Value) -> Fut,
        Fut: Future<Output = std::result::Result<R, anyhow::Error>>,
        R: Serialize,
    {
        match user_fn(event.clone()).await {
            Ok(value) => {
                let serialized = serde_json::to_string(&value)?;
                record.complete(now_secs(), self.config.record_ttl.as_secs(), serialized);
                self.with_timeout(self.store.update(&record)).await?;
                debug!(key, "user function completed, row marked COMPLETED");
                if let Some(cache) = &self.cache {
                    cache.put(record.clone());
                }
                self.decode_response(&record)
            }
            Err(cause) => {
                warn!(key, error = %cause, "user function failed, cleaning up in-progress row");
                if let Err(delete_err) = self.with_timeout(self.store.delete(key)).await {
                    warn!(key, error = %delete_err, "failed to delete in-progress row after handler failure");
                }
                Err(Error::HandlerFailed(cause))
            }
        }
    }
}

/// Wrap `user_fn` in an idempotency-aware closure with the same
/// `(event) -> Result<Value>` signature, replacing annotation-based wiring
/// with explicit higher-order composition.
pub fn wrap_handler<S, F, Fut, R>(
    handler: Arc<IdempotencyHandler<S>>,
    user_fn: F,
) -> impl Fn(Value) -> std::pin::Pin<Box<dyn Future<Output = Result<Value>> + Send>>
where
    S: PersistenceStore + 'static,
    F: Fn(Value) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<R, anyhow::Error>> + Send,
    R: Serialize + Send,
{
    move |event: Value| {
        let handler = Arc::clone(&handler);
        let user_fn = user_fn.clone();
        Box::pin(async move { handler.call(&event, user_fn).await })
    }
}
