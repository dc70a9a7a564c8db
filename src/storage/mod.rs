//! Storage module for persisting ingest data
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Provider configuration records
//! - Saga state documents (full replace on every save)
//! - Fingerprint records and completed batches

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{
    BatchStore, FingerprintStore, ProviderStore, SagaStore, StorageError, StorageResult,
};

use crate::Result;
use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(IngestError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage> {
    SqliteStorage::new(path)
}
