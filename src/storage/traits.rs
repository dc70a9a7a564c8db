//! Storage traits and error types
//!
//! Each trait is one consumed store contract. The saga and the
//! configuration cache depend only on these traits, never on SQLite.

use crate::fingerprint::RecipeFingerprint;
use crate::providers::ProviderConfiguration;
use crate::saga::{RecipeBatch, SagaState, SagaStatus};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Storage lock poisoned")]
    Poisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Provider configuration records keyed by provider id
///
/// The configuration cache only reads. `upsert_provider` exists for the
/// startup bootstrap that copies the configuration file into the store.
pub trait ProviderStore: Send + Sync {
    /// Gets one provider, enabled or not
    fn get_provider(&self, provider_id: &str) -> StorageResult<Option<ProviderConfiguration>>;

    /// Gets every enabled provider
    fn list_enabled_providers(&self) -> StorageResult<Vec<ProviderConfiguration>>;

    /// Gets every provider
    fn list_providers(&self) -> StorageResult<Vec<ProviderConfiguration>>;

    /// Inserts or replaces a provider record
    fn upsert_provider(&self, config: &ProviderConfiguration) -> StorageResult<()>;
}

/// Saga state documents keyed by correlation id
pub trait SagaStore: Send + Sync {
    /// Inserts a new saga; fails if the correlation id already exists
    fn insert_saga(&self, state: &SagaState) -> StorageResult<()>;

    /// Replaces the whole saga document
    fn save_saga(&self, state: &SagaState) -> StorageResult<()>;

    /// Looks a saga up by correlation id
    fn get_saga(&self, correlation_id: Uuid) -> StorageResult<Option<SagaState>>;

    /// Lists sagas, newest first, optionally filtered by status
    fn list_sagas(&self, status: Option<SagaStatus>) -> StorageResult<Vec<SagaState>>;
}

/// Duplicate markers keyed by (provider id, normalized URL)
pub trait FingerprintStore: Send + Sync {
    /// Checks whether a provider already has a fingerprint, without loading it
    fn fingerprint_exists(&self, provider_id: &str, fingerprint: &str) -> StorageResult<bool>;

    /// Loads the record for a provider's normalized URL
    fn find_fingerprint(
        &self,
        provider_id: &str,
        normalized_url: &str,
    ) -> StorageResult<Option<RecipeFingerprint>>;

    /// Inserts a fingerprint record
    ///
    /// Returns false when a record for the same key already existed.
    fn insert_fingerprint(&self, record: &RecipeFingerprint) -> StorageResult<bool>;
}

/// Append-only completed batches
pub trait BatchStore: Send + Sync {
    /// Appends a completed batch
    fn insert_batch(&self, batch: &RecipeBatch) -> StorageResult<()>;

    /// Lists the batches recorded for a provider, newest first
    fn list_batches(&self, provider_id: &str) -> StorageResult<Vec<RecipeBatch>>;
}
