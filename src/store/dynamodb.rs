//! Hosted persistence backend on top of a DynamoDB-compatible conditional-write
//! NoSQL service.
//!
//! The conditional expression is the crux of this module:
//!
//! ```text
//! attribute_not_exists(#pk) OR #exp < :now OR (#st = :inprogress AND #lease < :now_ms)
//! ```
//!
//! which encodes exactly [`DataRecord::is_logically_absent`] as a
//! server-side predicate, so the write is atomic across concurrent callers
//! without a read-modify-write round trip.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;

use crate::config::ColumnMapping;
use crate::error::{Error, Result};
use crate::record::{DataRecord, Status};
use crate::time::{now_ms, now_secs};

use super::{PersistenceStore, PutOutcome};

/// DynamoDB-backed [`PersistenceStore`].
pub struct DynamoDbStore {
    client: Client,
    table_name: String,
    columns: ColumnMapping,
}

impl DynamoDbStore {
    /// Build a store against `table_name` using an already-configured SDK
    /// client (typically built from `aws_config::load_defaults`).
    #[must_use]
    pub fn new(client: Client, table_name: String, columns: ColumnMapping) -> Self {
        Self {
            client,
            table_name,
            columns,
        }
    }

    fn status_str(status: Status) -> &'static str {
        match status {
            Status::InProgress => "INPROGRESS",
            Status::Completed => "COMPLETED",
            Status::Expired => "EXPIRED",
        }
    }

    fn key_map(&self, key: &str) -> HashMap<String, AttributeValue> {
        let mut map = HashMap::new();
        match &self.columns.static_partition_value {
            Some(partition) => {
                map.insert(
                    self.columns.partition_key.clone(),
                    AttributeValue::S(partition.clone()),
                );
                map.insert(
                    self.columns.sort_key.clone(),
                    AttributeValue::S(key.to_string()),
                );
            }
            None => {
                map.insert(
                    self.columns.partition_key.clone(),
                    AttributeValue::S(key.to_string()),
                );
            }
        }
        map
    }

    fn item_for(&self, record: &DataRecord) -> HashMap<String, AttributeValue> {
        let mut item = self.key_map(&record.idempotency_key);
        item.insert(
            self.columns.status.clone(),
            AttributeValue::S(Self::status_str(record.status).to_string()),
        );
        item.insert(
            self.columns.expiration.clone(),
            AttributeValue::N(record.expiry_ts.to_string()),
        );
        if let Some(lease) = record.in_progress_expiry_ms {
            item.insert(
                self.columns.in_progress_expiration.clone(),
                AttributeValue::N(lease.to_string()),
            );
        }
        if let Some(data) = &record.response_data {
            item.insert(self.columns.data.clone(), AttributeValue::S(data.clone()));
        }
        if let Some(hash) = &record.payload_hash {
            item.insert(
                self.columns.validation.clone(),
                AttributeValue::S(hash.clone()),
            );
        }
        item
    }

    fn record_from_item(
        &self,
        key: &str,
        item: &HashMap<String, AttributeValue>,
    ) -> Result<DataRecord> {
        let status = match item.get(&self.columns.status).and_then(|v| v.as_s().ok()) {
            Some(s) if s == "INPROGRESS" => Status::InProgress,
            Some(s) if s == "COMPLETED" => Status::Completed,
            _ => {
                return Err(Error::persistence(format!(
                    "row for key `{key}` missing a valid status column"
                )))
            }
        };
        let expiry_ts = item
            .get(&self.columns.expiration)
            .and_then(|v| v.as_n().ok())
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| Error::persistence(format!("row for key `{key}` missing expiration")))?;
        let in_progress_expiry_ms = item
            .get(&self.columns.in_progress_expiration)
            .and_then(|v| v.as_n().ok())
            .and_then(|n| n.parse().ok());
        let response_data = item
            .get(&self.columns.data)
            .and_then(|v| v.as_s().ok())
            .cloned();
        let payload_hash = item
            .get(&self.columns.validation)
            .and_then(|v| v.as_s().ok())
            .cloned();

        Ok(DataRecord {
            idempotency_key: key.to_string(),
            status,
            expiry_ts,
            in_progress_expiry_ms,
            response_data,
            payload_hash,
        })
    }

    fn map_sdk_error<E: std::fmt::Display>(context: &str, err: E) -> Error {
        Error::persistence(format!("{context}: {err}"))
    }
}

#[async_trait]
impl PersistenceStore for DynamoDbStore {
    async fn put(&self, record: &DataRecord) -> Result<PutOutcome> {
        let pk = self.columns.partition_key.clone();
        let condition = format!(
            "attribute_not_exists(#pk) OR #exp < :now OR (#st = :inprogress AND #lease < :now_ms)"
        );

        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(self.item_for(record)))
            .condition_expression(condition)
            .expression_attribute_names("#pk", &pk)
            .expression_attribute_names("#exp", &self.columns.expiration)
            .expression_attribute_names("#st", &self.columns.status)
            .expression_attribute_names("#lease", &self.columns.in_progress_expiration)
            .expression_attribute_values(":now", AttributeValue::N(now_secs().to_string()))
            .expression_attribute_values(":now_ms", AttributeValue::N(now_ms().to_string()))
            .expression_attribute_values(":inprogress", AttributeValue::S("INPROGRESS".to_string()))
            .send()
            .await;

        match result {
            Ok(_) => Ok(PutOutcome::Inserted),
            Err(err) => match err.as_service_error() {
                Some(service_err) if service_err.is_conditional_check_failed_exception() => {
                    Ok(PutOutcome::AlreadyExists)
                }
                _ => Err(Self::map_sdk_error("put_item failed", err)),
            },
        }
    }

    async fn get(&self, key: &str) -> Result<Option<DataRecord>> {
        let response = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .set_key(Some(self.key_map(key)))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error("get_item failed", e))?;

        response
            .item
            .map(|item| self.record_from_item(key, &item))
            .transpose()
    }

    async fn update(&self, record: &DataRecord) -> Result<()> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(self.item_for(record)))
            .send()
            .await
            .map_err(|e| Self::map_sdk_error("put_item (update) failed", e))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .set_key(Some(self.key_map(key)))
            .send()
            .await
            .map_err(|e| Self::map_sdk_error("delete_item failed", e))?;
        Ok(())
    }
}
