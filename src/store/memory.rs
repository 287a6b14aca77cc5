//! In-process persistence backend.
//!
//! Used as the default store for local development and the entire test
//! suite. Implements the exact conditional-write semantics the hosted store
//! provides, just guarded by a mutex instead of a conditional-expression
//! write to a remote service.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::Result;
use crate::record::DataRecord;
use crate::time::{now_ms, now_secs};

use super::{PersistenceStore, PutOutcome};

/// `HashMap`-backed [`PersistenceStore`], safe to share across tasks via
/// `Clone` (the inner map is `Arc`-wrapped).
#[derive(Clone, Default)]
pub struct MemoryStore {
    rows: Arc<RwLock<HashMap<String, DataRecord>>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently held, live or not. Test helper.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// `true` when the store holds no rows at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PersistenceStore for MemoryStore {
    async fn put(&self, record: &DataRecord) -> Result<PutOutcome> {
        let mut rows = self.rows.write();
        let (secs, ms) = (now_secs(), now_ms());
        match rows.get(&record.idempotency_key) {
            Some(existing) if !existing.is_logically_absent(secs, ms) => {
                Ok(PutOutcome::AlreadyExists)
            }
            _ => {
                rows.insert(record.idempotency_key.clone(), record.clone());
                Ok(PutOutcome::Inserted)
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Option<DataRecord>> {
        Ok(self.rows.read().get(key).cloned())
    }

    async fn update(&self, record: &DataRecord) -> Result<()> {
        self.rows
            .write()
            .insert(record.idempotency_key.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.rows.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Status;

    fn in_progress(key: &str, secs: u64, ms: u64) -> DataRecord {
        DataRecord::new_in_progress(key.to_string(), secs, ms, 3600, 30, None)
    }

    #[tokio::test]
    async fn put_inserts_when_key_absent() {
        let store = MemoryStore::new();
        let record = in_progress("k1", now_secs(), now_ms());
        assert_eq!(store.put(&record).await.unwrap(), PutOutcome::Inserted);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn put_rejects_live_duplicate() {
        let store = MemoryStore::new();
        let record = in_progress("k1", now_secs(), now_ms());
        store.put(&record).await.unwrap();
        let dup = in_progress("k1", now_secs(), now_ms());
        assert_eq!(store.put(&dup).await.unwrap(), PutOutcome::AlreadyExists);
    }

    #[tokio::test]
    async fn put_succeeds_once_lease_has_expired() {
        let store = MemoryStore::new();
        let stale = in_progress("k1", now_secs(), 0);
        store.put(&stale).await.unwrap();
        let fresh = in_progress("k1", now_secs(), now_ms());
        assert_eq!(store.put(&fresh).await.unwrap(), PutOutcome::Inserted);
    }

    #[tokio::test]
    async fn put_succeeds_once_ttl_has_elapsed() {
        let store = MemoryStore::new();
        let mut expired = in_progress("k1", 0, now_ms());
        expired.status = Status::Completed;
        expired.expiry_ts = 1;
        store.put(&expired).await.unwrap();
        let fresh = in_progress("k1", now_secs(), now_ms());
        assert_eq!(store.put(&fresh).await.unwrap(), PutOutcome::Inserted);
    }

    #[tokio::test]
    async fn update_overwrites_existing_row() {
        let store = MemoryStore::new();
        let mut record = in_progress("k1", now_secs(), now_ms());
        store.put(&record).await.unwrap();
        record.complete(now_secs(), 3600, "\"ok\"".to_string());
        store.update(&record).await.unwrap();
        let fetched = store.get("k1").await.unwrap().unwrap();
        assert_eq!(fetched.status, Status::Completed);
    }

    #[tokio::test]
    async fn delete_removes_row() {
        let store = MemoryStore::new();
        let record = in_progress("k1", now_secs(), now_ms());
        store.put(&record).await.unwrap();
        store.delete("k1").await.unwrap();
        assert!(store.get("k1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_returns_none_for_missing_key() {
        let store = MemoryStore::new();
        assert!(store.get("missing").await.unwrap().is_none());
    }
}
