//! Detection record store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use herd_models::{Detection, Recognition};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::StorageResult;

/// Persistence for single-image detection records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Store a new record and return it with its assigned id.
    async fn create(
        &self,
        image_path: String,
        detections: Vec<Detection>,
        count: usize,
    ) -> StorageResult<Recognition>;

    async fn get(&self, id: u64) -> StorageResult<Option<Recognition>>;

    /// Records newest first.
    async fn list(&self, offset: usize, limit: usize) -> StorageResult<Vec<Recognition>>;

    /// Returns `false` if no record had that id.
    async fn delete(&self, id: u64) -> StorageResult<bool>;

    async fn count(&self) -> StorageResult<u64>;

    /// Sum of `cows_count` over all records.
    async fn sum_counts(&self) -> StorageResult<u64>;
}

/// Process-local record store. Ids start at 1 and are never reused.
#[derive(Debug)]
pub struct MemoryRecordStore {
    records: RwLock<BTreeMap<u64, Recognition>>,
    next_id: AtomicU64,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn create(
        &self,
        image_path: String,
        detections: Vec<Detection>,
        count: usize,
    ) -> StorageResult<Recognition> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let record = Recognition {
            id,
            image_path,
            cows_count: count,
            result: detections,
            created_at: Utc::now(),
        };
        self.records.write().await.insert(id, record.clone());
        debug!(id, count, "Created detection record");
        Ok(record)
    }

    async fn get(&self, id: u64) -> StorageResult<Option<Recognition>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn list(&self, offset: usize, limit: usize) -> StorageResult<Vec<Recognition>> {
        // Ids are assigned in creation order
        Ok(self
            .records
            .read()
            .await
            .values()
            .rev()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn delete(&self, id: u64) -> StorageResult<bool> {
        Ok(self.records.write().await.remove(&id).is_some())
    }

    async fn count(&self) -> StorageResult<u64> {
        Ok(self.records.read().await.len() as u64)
    }

    async fn sum_counts(&self) -> StorageResult<u64> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .map(|r| r.cows_count as u64)
            .sum())
    }
}
