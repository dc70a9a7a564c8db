use crate::saga::SagaState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted result of one saga run
///
/// Built from the saga's data when persisting starts and written exactly
/// once; batches are never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeBatch {
    pub batch_id: Uuid,
    pub correlation_id: Uuid,
    pub provider_id: String,
    pub batch_size: usize,
    pub time_window_ms: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub processed: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
    pub processed_count: usize,
    pub skipped_count: usize,
    pub failed_count: usize,
}

impl RecipeBatch {
    /// Builds an incomplete batch from the three URL buckets of a saga
    pub fn from_state(batch_id: Uuid, state: &SagaState) -> Self {
        let processed: Vec<String> = state.data.processed.iter().map(|p| p.url.clone()).collect();
        let skipped = state.data.duplicates.clone();
        let failed: Vec<String> = state.data.failed.iter().map(|f| f.url.clone()).collect();

        Self {
            batch_id,
            correlation_id: state.correlation_id,
            provider_id: state.provider_id.clone(),
            batch_size: state.settings.batch_size,
            time_window_ms: state.settings.time_window_ms,
            started_at: state.started_at,
            completed_at: None,
            processed_count: processed.len(),
            skipped_count: skipped.len(),
            failed_count: failed.len(),
            processed,
            skipped,
            failed,
        }
    }

    pub fn complete(&mut self) {
        self.completed_at = Some(Utc::now());
    }

    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }
}
