//! Pluggable persistence layer.
//!
//! [`PersistenceStore`] is the seam between the state machine in
//! [`crate::handler`] and whatever conditional-write-capable backend is
//! actually storing rows. Two implementations ship in this crate: an
//! in-process [`memory::MemoryStore`] (default, used in tests and for local
//! development) and a hosted [`dynamodb::DynamoDbStore`] behind the
//! `dynamodb` feature.

pub mod memory;

#[cfg(feature = "dynamodb")]
pub mod dynamodb;

use async_trait::async_trait;

use crate::error::Result;
use crate::record::DataRecord;

/// Outcome of a conditional `put`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// No live row existed under this key; the new row was written.
    Inserted,
    /// A live row already existed; nothing was written. The caller must
    /// fetch it with [`PersistenceStore::get`] to decide how to proceed.
    AlreadyExists,
}

/// Conditional-write persistence backend for idempotency records.
///
/// Every method must be safe to call concurrently from multiple processes —
/// the conditional semantics of [`Self::put`] are what make the whole
/// protocol correct under concurrent duplicate invocations.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    /// Write `record` iff no live row currently occupies its key: that is,
    /// iff no row exists, or the existing row is [`DataRecord::is_logically_absent`]
    /// (TTL elapsed, or an `INPROGRESS` lease that has lapsed).
    ///
    /// Must be atomic with respect to the existence/liveness check — this is
    /// the single linearization point that arbitrates between racing
    /// duplicate invocations.
    async fn put(&self, record: &DataRecord) -> Result<PutOutcome>;

    /// Fetch the current row for `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<DataRecord>>;

    /// Unconditionally overwrite the row for `key` with `record`.
    ///
    /// Called only by the owner of a lease it itself just acquired via
    /// [`Self::put`] (transitioning `INPROGRESS` to `COMPLETED`), so no
    /// conditional check is required here.
    async fn update(&self, record: &DataRecord) -> Result<()>;

    /// Delete the row for `key`, releasing its lease.
    ///
    /// Called when the wrapped user function fails, so a retry is not
    /// blocked by a dead `INPROGRESS` row until its lease naturally expires.
    async fn delete(&self, key: &str) -> Result<()>;
}
