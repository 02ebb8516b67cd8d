//! Storage for the herdwatch backend.
//!
//! This crate provides:
//! - A local upload store with unique, append-only file names
//! - HTTP byte-range parsing and resolution
//! - The detection record store contract with in-memory and SQLite implementations

pub mod error;
pub mod files;
pub mod range;
pub mod records;
pub mod sqlite;

pub use error::{StorageError, StorageResult};
pub use files::LocalFileStore;
pub use range::{unsatisfied_content_range, ByteRange, RangeRequest};
pub use records::{MemoryRecordStore, RecordStore};
pub use sqlite::SqliteRecordStore;
