//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Recipe-Ingest database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Provider configurations, seeded from the config file
CREATE TABLE IF NOT EXISTS providers (
    provider_id TEXT PRIMARY KEY,
    enabled INTEGER NOT NULL,
    discovery_strategy TEXT NOT NULL,
    root_url TEXT NOT NULL,
    batch_size INTEGER NOT NULL,
    time_window_minutes INTEGER NOT NULL,
    min_delay_seconds INTEGER NOT NULL,
    max_requests_per_minute INTEGER NOT NULL,
    retry_count INTEGER NOT NULL,
    request_timeout_seconds INTEGER NOT NULL,
    recipe_url_pattern TEXT,
    category_url_pattern TEXT,
    max_depth INTEGER NOT NULL,
    max_urls INTEGER NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_providers_enabled ON providers(enabled);

-- One document per saga run; every save replaces it
CREATE TABLE IF NOT EXISTS sagas (
    correlation_id TEXT PRIMARY KEY,
    provider_id TEXT NOT NULL,
    current_phase TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    document TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sagas_status ON sagas(status);
CREATE INDEX IF NOT EXISTS idx_sagas_provider ON sagas(provider_id);

-- First-seen URLs
CREATE TABLE IF NOT EXISTS fingerprints (
    provider_id TEXT NOT NULL,
    normalized_url TEXT NOT NULL,
    fingerprint TEXT NOT NULL,
    correlation_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (provider_id, normalized_url)
);

CREATE INDEX IF NOT EXISTS idx_fingerprints_fingerprint ON fingerprints(fingerprint);

-- Completed batches, append-only
CREATE TABLE IF NOT EXISTS batches (
    batch_id TEXT PRIMARY KEY,
    correlation_id TEXT NOT NULL,
    provider_id TEXT NOT NULL,
    processed_count INTEGER NOT NULL,
    skipped_count INTEGER NOT NULL,
    failed_count INTEGER NOT NULL,
    completed_at TEXT,
    document TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_batches_provider ON batches(provider_id);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
