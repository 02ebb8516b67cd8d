//! SQLite-backed detection record store.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use herd_models::{Detection, Recognition};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::records::RecordStore;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS recognitions (
      id INTEGER PRIMARY KEY AUTOINCREMENT,
      image_path TEXT NOT NULL,
      result_json TEXT NOT NULL,
      cows_count INTEGER NOT NULL,
      created_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_recognitions_created_at ON recognitions (created_at);
"#;

/// Record store persisted in a SQLite database file.
///
/// Ids come from `AUTOINCREMENT`, so they start at 1 and are never reused.
/// Queries run on the blocking pool behind a single connection.
#[derive(Clone)]
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    /// Open (creating if needed) the database at `path`.
    pub async fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let conn = tokio::task::spawn_blocking(move || -> StorageResult<Connection> {
            let conn = Connection::open(&path)?;
            conn.execute_batch(SCHEMA)?;
            info!(path = %path.display(), "Opened record database");
            Ok(conn)
        })
        .await
        .map_err(|e| StorageError::internal(format!("database open task failed: {}", e)))??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StorageResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| StorageError::internal("record database lock poisoned"))?;
            f(&conn)
        })
        .await
        .map_err(|e| StorageError::internal(format!("database task failed: {}", e)))?
    }
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_else(Utc::now)
}

fn row_to_recognition(row: &Row<'_>) -> rusqlite::Result<(Recognition, String)> {
    let id: i64 = row.get(0)?;
    let cows_count: i64 = row.get(3)?;
    let created_at: i64 = row.get(4)?;
    Ok((
        Recognition {
            id: id as u64,
            image_path: row.get(1)?,
            cows_count: cows_count.max(0) as usize,
            result: Vec::new(),
            created_at: millis_to_datetime(created_at),
        },
        row.get(2)?,
    ))
}

fn decode_result((mut record, json): (Recognition, String)) -> StorageResult<Recognition> {
    record.result = serde_json::from_str(&json)?;
    Ok(record)
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn create(
        &self,
        image_path: String,
        detections: Vec<Detection>,
        count: usize,
    ) -> StorageResult<Recognition> {
        let result_json = serde_json::to_string(&detections)?;
        let created_at = Utc::now();
        let millis = created_at.timestamp_millis();

        let (id, image_path) = self
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO recognitions (image_path, result_json, cows_count, created_at) VALUES (?1, ?2, ?3, ?4)",
                    params![image_path, result_json, count as i64, millis],
                )?;
                Ok((conn.last_insert_rowid() as u64, image_path))
            })
            .await?;

        debug!(id, count, "Created detection record");
        Ok(Recognition {
            id,
            image_path,
            cows_count: count,
            result: detections,
            created_at: millis_to_datetime(millis),
        })
    }

    async fn get(&self, id: u64) -> StorageResult<Option<Recognition>> {
        let row = self
            .with_conn(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT id, image_path, result_json, cows_count, created_at FROM recognitions WHERE id = ?1",
                        params![id as i64],
                        row_to_recognition,
                    )
                    .optional()?)
            })
            .await?;
        row.map(decode_result).transpose()
    }

    async fn list(&self, offset: usize, limit: usize) -> StorageResult<Vec<Recognition>> {
        let rows = self
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, image_path, result_json, cows_count, created_at FROM recognitions ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2",
                )?;
                let rows = stmt
                    .query_map(
                        params![limit.min(i64::MAX as usize) as i64, offset.min(i64::MAX as usize) as i64],
                        row_to_recognition,
                    )?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        rows.into_iter().map(decode_result).collect()
    }

    async fn delete(&self, id: u64) -> StorageResult<bool> {
        self.with_conn(move |conn| {
            let removed = conn.execute("DELETE FROM recognitions WHERE id = ?1", params![id as i64])?;
            Ok(removed > 0)
        })
        .await
    }

    async fn count(&self) -> StorageResult<u64> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM recognitions", [], |r| r.get(0))?;
            Ok(n.max(0) as u64)
        })
        .await
    }

    async fn sum_counts(&self) -> StorageResult<u64> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COALESCE(SUM(cows_count), 0) FROM recognitions",
                [],
                |r| r.get(0),
            )?;
            Ok(n.max(0) as u64)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herd_models::BoundingBox;
    use tempfile::TempDir;

    fn cow() -> Detection {
        Detection::new("cow", 0.75, BoundingBox::new(1.0, 2.0, 30.0, 40.0))
    }

    #[tokio::test]
    async fn test_crud_and_stats() {
        let dir = TempDir::new().unwrap();
        let store = SqliteRecordStore::open(dir.path().join("records.db"))
            .await
            .unwrap();

        let a = store.create("a.jpg".into(), vec![cow(), cow()], 2).await.unwrap();
        let b = store.create("b.jpg".into(), vec![cow()], 1).await.unwrap();
        assert_eq!((a.id, b.id), (1, 2));

        let loaded = store.get(1).await.unwrap().unwrap();
        assert_eq!(loaded.image_path, "a.jpg");
        assert_eq!(loaded.cows_count, 2);
        assert_eq!(loaded.result, vec![cow(), cow()]);
        assert_eq!(loaded.created_at, a.created_at);

        assert_eq!(store.count().await.unwrap(), 2);
        assert_eq!(store.sum_counts().await.unwrap(), 3);

        let ids: Vec<u64> = store
            .list(0, 10)
            .await
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(store.list(1, 10).await.unwrap().len(), 1);

        assert!(store.delete(1).await.unwrap());
        assert!(!store.delete(1).await.unwrap());
        assert!(store.get(1).await.unwrap().is_none());
        assert_eq!(store.sum_counts().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("records.db");

        {
            let store = SqliteRecordStore::open(&path).await.unwrap();
            store.create("kept.png".into(), vec![cow()], 1).await.unwrap();
            store.create("gone.png".into(), vec![], 0).await.unwrap();
            assert!(store.delete(2).await.unwrap());
        }

        let store = SqliteRecordStore::open(&path).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.get(1).await.unwrap().unwrap().image_path, "kept.png");

        // Deleted ids are not handed out again
        let next = store.create("new.png".into(), vec![], 0).await.unwrap();
        assert_eq!(next.id, 3);
    }

    #[tokio::test]
    async fn test_empty_store_stats() {
        let dir = TempDir::new().unwrap();
        let store = SqliteRecordStore::open(dir.path().join("r.db")).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(store.sum_counts().await.unwrap(), 0);
        assert!(store.list(0, 100).await.unwrap().is_empty());
    }
}
