//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the store traits.
//! The connection sits behind a mutex so one storage value can be shared by
//! concurrent saga runs.

use crate::fingerprint::RecipeFingerprint;
use crate::providers::{DiscoveryStrategyKind, ProviderConfiguration};
use crate::saga::{RecipeBatch, SagaState, SagaStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{
    BatchStore, FingerprintStore, ProviderStore, SagaStore, StorageError, StorageResult,
};
use crate::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(IngestError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database (for testing)
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }
}

const PROVIDER_COLUMNS: &str = "provider_id, enabled, discovery_strategy, root_url, batch_size, \
     time_window_minutes, min_delay_seconds, max_requests_per_minute, retry_count, \
     request_timeout_seconds, recipe_url_pattern, category_url_pattern, max_depth, max_urls";

/// Provider row before the strategy string is checked
struct ProviderRow {
    strategy: String,
    config: ProviderConfiguration,
}

fn read_provider_row(row: &Row<'_>) -> rusqlite::Result<ProviderRow> {
    Ok(ProviderRow {
        strategy: row.get(2)?,
        config: ProviderConfiguration {
            provider_id: row.get(0)?,
            enabled: row.get(1)?,
            discovery_strategy: DiscoveryStrategyKind::Static,
            root_url: row.get(3)?,
            batch_size: row.get(4)?,
            time_window_minutes: row.get(5)?,
            min_delay_seconds: row.get(6)?,
            max_requests_per_minute: row.get(7)?,
            retry_count: row.get(8)?,
            request_timeout_seconds: row.get(9)?,
            recipe_url_pattern: row.get(10)?,
            category_url_pattern: row.get(11)?,
            max_depth: row.get(12)?,
            max_urls: row.get(13)?,
        },
    })
}

impl ProviderRow {
    fn into_config(self) -> StorageResult<ProviderConfiguration> {
        let mut config = self.config;
        config.discovery_strategy = self.strategy.parse().map_err(|_| {
            StorageError::Corrupt(format!(
                "provider {} has unsupported discovery strategy '{}'",
                config.provider_id, self.strategy
            ))
        })?;
        Ok(config)
    }
}

fn parse_timestamp(value: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt(format!("invalid timestamp '{}': {}", value, e)))
}

fn parse_uuid(value: &str) -> StorageResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| StorageError::Corrupt(format!("invalid uuid '{}': {}", value, e)))
}

fn is_constraint_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

impl ProviderStore for SqliteStorage {
    fn get_provider(&self, provider_id: &str) -> StorageResult<Option<ProviderConfiguration>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM providers WHERE provider_id = ?1", PROVIDER_COLUMNS),
                params![provider_id],
                read_provider_row,
            )
            .optional()?;

        row.map(ProviderRow::into_config).transpose()
    }

    fn list_enabled_providers(&self) -> StorageResult<Vec<ProviderConfiguration>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM providers WHERE enabled = 1 ORDER BY provider_id",
            PROVIDER_COLUMNS
        ))?;

        let rows = stmt
            .query_map([], read_provider_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(ProviderRow::into_config).collect()
    }

    fn list_providers(&self) -> StorageResult<Vec<ProviderConfiguration>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM providers ORDER BY provider_id",
            PROVIDER_COLUMNS
        ))?;

        let rows = stmt
            .query_map([], read_provider_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(ProviderRow::into_config).collect()
    }

    fn upsert_provider(&self, config: &ProviderConfiguration) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO providers ({}, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                PROVIDER_COLUMNS
            ),
            params![
                config.provider_id,
                config.enabled,
                config.discovery_strategy.to_db_string(),
                config.root_url,
                config.batch_size,
                config.time_window_minutes,
                config.min_delay_seconds,
                config.max_requests_per_minute,
                config.retry_count,
                config.request_timeout_seconds,
                config.recipe_url_pattern,
                config.category_url_pattern,
                config.max_depth,
                config.max_urls,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

impl SagaStore for SqliteStorage {
    fn insert_saga(&self, state: &SagaState) -> StorageResult<()> {
        let document = serde_json::to_string(state)?;
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO sagas (correlation_id, provider_id, current_phase, status, started_at, updated_at, document)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                state.correlation_id.to_string(),
                state.provider_id,
                state.current_phase.as_str(),
                state.status.to_db_string(),
                state.started_at.to_rfc3339(),
                Utc::now().to_rfc3339(),
                document,
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                StorageError::ConstraintViolation(format!(
                    "saga {} already exists",
                    state.correlation_id
                ))
            } else {
                StorageError::Sqlite(e)
            }
        })?;

        Ok(())
    }

    fn save_saga(&self, state: &SagaState) -> StorageResult<()> {
        let document = serde_json::to_string(state)?;
        let conn = self.conn()?;

        let updated = conn.execute(
            "UPDATE sagas SET current_phase = ?1, status = ?2, updated_at = ?3, document = ?4
             WHERE correlation_id = ?5",
            params![
                state.current_phase.as_str(),
                state.status.to_db_string(),
                Utc::now().to_rfc3339(),
                document,
                state.correlation_id.to_string(),
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::NotFound(format!(
                "saga {}",
                state.correlation_id
            )));
        }
        Ok(())
    }

    fn get_saga(&self, correlation_id: Uuid) -> StorageResult<Option<SagaState>> {
        let conn = self.conn()?;
        let document: Option<String> = conn
            .query_row(
                "SELECT document FROM sagas WHERE correlation_id = ?1",
                params![correlation_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        match document {
            Some(doc) => Ok(Some(serde_json::from_str(&doc)?)),
            None => Ok(None),
        }
    }

    fn list_sagas(&self, status: Option<SagaStatus>) -> StorageResult<Vec<SagaState>> {
        let conn = self.conn()?;

        let documents: Vec<String> = match status {
            Some(status) => {
                let mut stmt = conn.prepare(
                    "SELECT document FROM sagas WHERE status = ?1 ORDER BY started_at DESC",
                )?;
                let rows = stmt.query_map(params![status.to_db_string()], |row| row.get(0))?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = conn.prepare("SELECT document FROM sagas ORDER BY started_at DESC")?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };

        documents
            .iter()
            .map(|doc| serde_json::from_str(doc).map_err(StorageError::from))
            .collect()
    }
}

impl FingerprintStore for SqliteStorage {
    fn fingerprint_exists(&self, provider_id: &str, fingerprint: &str) -> StorageResult<bool> {
        let conn = self.conn()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM fingerprints WHERE provider_id = ?1 AND fingerprint = ?2)",
            params![provider_id, fingerprint],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn find_fingerprint(
        &self,
        provider_id: &str,
        normalized_url: &str,
    ) -> StorageResult<Option<RecipeFingerprint>> {
        let conn = self.conn()?;
        let row: Option<(String, String, String, String, String)> = conn
            .query_row(
                "SELECT provider_id, normalized_url, fingerprint, correlation_id, created_at
                 FROM fingerprints WHERE provider_id = ?1 AND normalized_url = ?2",
                params![provider_id, normalized_url],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .optional()?;

        let Some((provider_id, normalized_url, fingerprint, correlation_id, created_at)) = row
        else {
            return Ok(None);
        };

        Ok(Some(RecipeFingerprint {
            provider_id,
            normalized_url,
            fingerprint,
            correlation_id: parse_uuid(&correlation_id)?,
            created_at: parse_timestamp(&created_at)?,
        }))
    }

    fn insert_fingerprint(&self, record: &RecipeFingerprint) -> StorageResult<bool> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO fingerprints
             (provider_id, normalized_url, fingerprint, correlation_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.provider_id,
                record.normalized_url,
                record.fingerprint,
                record.correlation_id.to_string(),
                record.created_at.to_rfc3339(),
            ],
        )?;
        Ok(inserted > 0)
    }
}

impl BatchStore for SqliteStorage {
    fn insert_batch(&self, batch: &RecipeBatch) -> StorageResult<()> {
        let document = serde_json::to_string(batch)?;
        let conn = self.conn()?;

        // Re-inserting the same batch id is a no-op, so a resumed run
        // that crashed after this write does not append twice
        conn.execute(
            "INSERT OR IGNORE INTO batches
             (batch_id, correlation_id, provider_id, processed_count, skipped_count, failed_count, completed_at, document)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                batch.batch_id.to_string(),
                batch.correlation_id.to_string(),
                batch.provider_id,
                batch.processed_count as i64,
                batch.skipped_count as i64,
                batch.failed_count as i64,
                batch.completed_at.map(|t| t.to_rfc3339()),
                document,
            ],
        )?;
        Ok(())
    }

    fn list_batches(&self, provider_id: &str) -> StorageResult<Vec<RecipeBatch>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT document FROM batches WHERE provider_id = ?1 ORDER BY completed_at DESC",
        )?;
        let documents = stmt
            .query_map(params![provider_id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        documents
            .iter()
            .map(|doc| serde_json::from_str(doc).map_err(StorageError::from))
            .collect()
    }
}
