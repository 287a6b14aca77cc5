//! The persisted row shape shared by every store implementation.

use serde::{Deserialize, Serialize};

/// Status of a [`DataRecord`].
///
/// `Expired` is never written — it is derived on read when `expiry_ts <= now`
/// (see [`DataRecord::effective_status`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// A user function is currently executing under this key's lease.
    InProgress,
    /// The user function completed; `response_data` holds its serialized result.
    Completed,
    /// Derived, never stored: `expiry_ts <= now` at read time.
    Expired,
}

/// A single row in the persistence store.
///
/// Units are fixed: `expiry_ts` is always unix **seconds**; `in_progress_expiry_ms`
/// is the one field that uses unix **milliseconds**, because the lease deadline
/// needs finer granularity than the TTL column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataRecord {
    /// Primary lookup key: `"{function_name}#{hex_digest}"` (optionally prefixed).
    pub idempotency_key: String,
    /// Current status as last written. Use [`Self::effective_status`] to
    /// account for TTL expiry.
    pub status: Status,
    /// Unix seconds after which this row is meaningless and may be
    /// overwritten or garbage-collected.
    pub expiry_ts: u64,
    /// Unix milliseconds marking the in-progress lease deadline. `None` once
    /// the record has transitioned to `Completed`.
    pub in_progress_expiry_ms: Option<u64>,
    /// Serialized successful return value. Present iff `status == Completed`.
    pub response_data: Option<String>,
    /// Hash of the payload-validation subtree, present only when payload
    /// validation is enabled for this key's invocation.
    pub payload_hash: Option<String>,
}

impl DataRecord {
    /// Construct a fresh `INPROGRESS` record.
    #[must_use]
    pub fn new_in_progress(
        idempotency_key: String,
        now_secs: u64,
        now_ms: u64,
        record_ttl_secs: u64,
        execution_timeout_secs: u64,
        payload_hash: Option<String>,
    ) -> Self {
        Self {
            idempotency_key,
            status: Status::InProgress,
            expiry_ts: now_secs + record_ttl_secs,
            in_progress_expiry_ms: Some(now_ms + execution_timeout_secs * 1000),
            response_data: None,
            payload_hash,
        }
    }

    /// Transition this record to `COMPLETED`, carrying the serialized response.
    pub fn complete(&mut self, now_secs: u64, record_ttl_secs: u64, response_data: String) {
        self.status = Status::Completed;
        self.expiry_ts = now_secs + record_ttl_secs;
        self.in_progress_expiry_ms = None;
        self.response_data = Some(response_data);
    }

    /// Status after accounting for TTL expiry: a row whose `expiry_ts` has
    /// passed reads as `Expired` regardless of what was last written.
    #[must_use]
    pub fn effective_status(&self, now_secs: u64) -> Status {
        if self.expiry_ts <= now_secs {
            Status::Expired
        } else {
            self.status
        }
    }

    /// `true` when this record's in-progress lease has lapsed, i.e. the row
    /// is logically absent and a new `put` may overwrite it.
    #[must_use]
    pub fn lease_expired(&self, now_ms: u64) -> bool {
        match self.status {
            Status::InProgress => match self.in_progress_expiry_ms {
                Some(deadline) => deadline <= now_ms,
                None => true,
            },
            Status::Completed | Status::Expired => false,
        }
    }

    /// `true` when a conditional `put` would be allowed to overwrite this
    /// row: either its TTL has passed, or its in-progress lease has lapsed.
    #[must_use]
    pub fn is_logically_absent(&self, now_secs: u64, now_ms: u64) -> bool {
        self.effective_status(now_secs) == Status::Expired || self.lease_expired(now_ms)
    }
}
