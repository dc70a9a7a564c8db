//! Saga state
//!
//! One [`SagaState`] document exists per processing run. It is created when
//! the run starts, replaced in the store after every phase and checkpoint, and
//! never deleted; a non-terminal document is the resumption point after a
//! restart.

use crate::discovery::DiscoveredUrl;
use crate::retry::ErrorClass;
use crate::{IngestError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error as _;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Phase of a saga run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SagaPhase {
    Discovering,
    Fingerprinting,
    Processing,
    Persisting,
    Completed,
    /// Absorbing failure state, reachable from any running phase
    Failed,
}

/// Forward order of the phases a successful run goes through
pub const PHASE_ORDER: [SagaPhase; 5] = [
    SagaPhase::Discovering,
    SagaPhase::Fingerprinting,
    SagaPhase::Processing,
    SagaPhase::Persisting,
    SagaPhase::Completed,
];

impl SagaPhase {
    /// Position in [`PHASE_ORDER`]; `None` for `Failed`
    pub fn index(&self) -> Option<usize> {
        PHASE_ORDER.iter().position(|p| p == self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaPhase::Completed | SagaPhase::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SagaPhase::Discovering => "discovering",
            SagaPhase::Fingerprinting => "fingerprinting",
            SagaPhase::Processing => "processing",
            SagaPhase::Persisting => "persisting",
            SagaPhase::Completed => "completed",
            SagaPhase::Failed => "failed",
        }
    }
}

impl fmt::Display for SagaPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal status of a saga run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SagaStatus {
    Running,
    Completed,
    Failed,
}

impl SagaStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// Run limits fixed when the saga starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaSettings {
    /// Successfully processed items after which processing stops
    pub batch_size: usize,
    /// Processing time limit in milliseconds
    pub time_window_ms: u64,
}

impl SagaSettings {
    pub fn new(batch_size: usize, time_window: Duration) -> Self {
        Self {
            batch_size,
            time_window_ms: u64::try_from(time_window.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn time_window(&self) -> Duration {
        Duration::from_millis(self.time_window_ms)
    }
}

/// A discovered URL that passed duplicate detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingerprintedUrl {
    /// URL as discovered; this is what gets fetched
    pub url: String,
    pub normalized_url: String,
    pub fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedUrl {
    pub url: String,
    pub title: Option<String>,
    pub ingredient_count: usize,
    pub processed_at: DateTime<Utc>,
}

/// A URL whose processing failed, with its error context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedUrl {
    pub url: String,
    /// Short name of the error kind, e.g. `not_found`
    pub error_type: String,
    pub classification: ErrorClass,
    pub transient: bool,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl FailedUrl {
    pub fn from_error(url: &str, error: &IngestError, classification: ErrorClass) -> Self {
        Self {
            url: url.to_string(),
            error_type: error_type(error).to_string(),
            classification,
            transient: classification.is_retryable(),
            message: error.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Typed phase outputs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SagaData {
    pub discovered: Vec<DiscoveredUrl>,
    pub fingerprinted: Vec<FingerprintedUrl>,
    /// Discovered URLs skipped as duplicates
    pub duplicates: Vec<String>,
    pub processed: Vec<ProcessedUrl>,
    pub failed: Vec<FailedUrl>,
    /// Next index into `discovered` to fingerprint
    pub fingerprint_cursor: usize,
    /// Next index into `fingerprinted` to process
    pub cursor: usize,
    /// Assigned when persisting starts so a resumed run reuses it
    pub batch_id: Option<Uuid>,
}

/// Failure details of a failed saga
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaFailure {
    pub phase: SagaPhase,
    pub message: String,
    /// `source()` chain of the error, outermost first
    pub context: Vec<String>,
}

impl SagaFailure {
    pub fn from_error(phase: SagaPhase, error: &IngestError) -> Self {
        let mut context = Vec::new();
        let mut source = error.source();
        while let Some(inner) = source {
            context.push(inner.to_string());
            source = inner.source();
        }

        Self {
            phase,
            message: error.to_string(),
            context,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointCounters {
    pub discovered: usize,
    pub fingerprinted: usize,
    pub duplicates: usize,
    pub processed: usize,
    pub failed: usize,
    pub cursor: usize,
}

/// Named snapshot of the counters at a point in the run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub counters: CheckpointCounters,
}

/// Summary written when a run completes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaMetrics {
    pub processed_count: usize,
    pub failed_count: usize,
    pub duplicate_count: usize,
    pub elapsed_ms: u64,
    /// Elapsed time divided by processed plus failed items
    pub average_ms_per_item: f64,
}

/// Persistent state of one saga run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaState {
    pub correlation_id: Uuid,
    pub provider_id: String,
    pub current_phase: SagaPhase,
    pub settings: SagaSettings,
    pub data: SagaData,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: SagaStatus,
    pub failure: Option<SagaFailure>,
    pub checkpoints: Vec<Checkpoint>,
    pub metrics: Option<SagaMetrics>,
}

impl SagaState {
    pub fn new(provider_id: &str, settings: SagaSettings) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            provider_id: provider_id.to_string(),
            current_phase: SagaPhase::Discovering,
            settings,
            data: SagaData::default(),
            started_at: Utc::now(),
            finished_at: None,
            status: SagaStatus::Running,
            failure: None,
            checkpoints: Vec::new(),
            metrics: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != SagaStatus::Running
    }

    /// Moves the saga forward to `next`
    ///
    /// Phases only ever move forward through [`PHASE_ORDER`]; use
    /// [`SagaState::mark_failed`] for failures.
    pub fn advance_to(&mut self, next: SagaPhase) -> Result<()> {
        let invalid = || IngestError::InvalidPhaseTransition {
            from: self.current_phase,
            to: next,
        };

        let (from, to) = match (self.current_phase.index(), next.index()) {
            (Some(from), Some(to)) => (from, to),
            _ => return Err(invalid()),
        };

        if to <= from {
            return Err(invalid());
        }

        self.current_phase = next;
        if next == SagaPhase::Completed {
            self.status = SagaStatus::Completed;
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Records an unhandled error and moves to `Failed`
    pub fn mark_failed(&mut self, error: &IngestError) {
        self.failure = Some(SagaFailure::from_error(self.current_phase, error));
        self.current_phase = SagaPhase::Failed;
        self.status = SagaStatus::Failed;
        self.finished_at = Some(Utc::now());
    }

    pub fn counters(&self) -> CheckpointCounters {
        CheckpointCounters {
            discovered: self.data.discovered.len(),
            fingerprinted: self.data.fingerprinted.len(),
            duplicates: self.data.duplicates.len(),
            processed: self.data.processed.len(),
            failed: self.data.failed.len(),
            cursor: self.data.cursor,
        }
    }

    /// Appends a named checkpoint with the current counters
    pub fn checkpoint(&mut self, label: impl Into<String>) {
        self.checkpoints.push(Checkpoint {
            label: label.into(),
            created_at: Utc::now(),
            counters: self.counters(),
        });
    }

    /// Computes the summary metrics from the current data
    pub fn compute_metrics(&self, now: DateTime<Utc>) -> SagaMetrics {
        let elapsed_ms = (now - self.started_at).num_milliseconds().max(0) as u64;
        let units = self.data.processed.len() + self.data.failed.len();
        let average_ms_per_item = if units == 0 {
            0.0
        } else {
            elapsed_ms as f64 / units as f64
        };

        SagaMetrics {
            processed_count: self.data.processed.len(),
            failed_count: self.data.failed.len(),
            duplicate_count: self.data.duplicates.len(),
            elapsed_ms,
            average_ms_per_item,
        }
    }
}

/// Short stable name for an error kind
pub fn error_type(error: &IngestError) -> &'static str {
    match error {
        IngestError::Config(_) => "config",
        IngestError::Http { .. } | IngestError::Reqwest(_) => "http",
        IngestError::HttpStatus { .. } => "http_status",
        IngestError::NotFound { .. } => "not_found",
        IngestError::RateLimitedResponse { .. } => "rate_limited",
        IngestError::Timeout { .. } => "timeout",
        IngestError::MalformedContent { .. } => "malformed_content",
        IngestError::Render { .. } => "render",
        IngestError::UnsupportedStrategy(_) => "unsupported_strategy",
        IngestError::RendererUnavailable(_) => "renderer_unavailable",
        IngestError::ProviderNotFound(_) => "provider_not_found",
        IngestError::NoEnabledProviders => "no_enabled_providers",
        IngestError::SagaNotFound(_) => "saga_not_found",
        IngestError::SagaTerminal { .. } => "saga_terminal",
        IngestError::InvalidPhaseTransition { .. } => "invalid_phase_transition",
        IngestError::Cancelled => "cancelled",
        IngestError::Storage(_) | IngestError::Database(_) => "storage",
        IngestError::Json(_) => "json",
        IngestError::UrlError(_) | IngestError::UrlParse(_) => "url",
        IngestError::Io(_) => "io",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SagaState {
        SagaState::new("p", SagaSettings::new(5, Duration::from_secs(60)))
    }

    #[test]
    fn test_new_state() {
        let state = state();
        assert_eq!(state.current_phase, SagaPhase::Discovering);
        assert_eq!(state.status, SagaStatus::Running);
        assert!(!state.is_terminal());
        assert!(state.finished_at.is_none());
    }

    #[test]
    fn test_settings_keep_sub_second_window() {
        let settings = SagaSettings::new(10, Duration::from_millis(900));
        assert_eq!(settings.time_window_ms, 900);
        assert_eq!(settings.time_window(), Duration::from_millis(900));

        let json = serde_json::to_string(&settings).unwrap();
        let restored: SagaSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.time_window(), Duration::from_millis(900));
    }

    #[test]
    fn test_phase_order_indices() {
        assert_eq!(SagaPhase::Discovering.index(), Some(0));
        assert_eq!(SagaPhase::Completed.index(), Some(4));
        assert_eq!(SagaPhase::Failed.index(), None);
    }

    #[test]
    fn test_advance_forward() {
        let mut state = state();
        state.advance_to(SagaPhase::Fingerprinting).unwrap();
        state.advance_to(SagaPhase::Processing).unwrap();
        state.advance_to(SagaPhase::Persisting).unwrap();
        state.advance_to(SagaPhase::Completed).unwrap();

        assert_eq!(state.status, SagaStatus::Completed);
        assert!(state.finished_at.is_some());
    }

    #[test]
    fn test_advance_backwards_rejected() {
        let mut state = state();
        state.advance_to(SagaPhase::Processing).unwrap();

        assert!(matches!(
            state.advance_to(SagaPhase::Fingerprinting),
            Err(IngestError::InvalidPhaseTransition { .. })
        ));
        assert!(state.advance_to(SagaPhase::Processing).is_err());
        assert!(state.advance_to(SagaPhase::Failed).is_err());
    }

    #[test]
    fn test_failed_is_absorbing() {
        let mut state = state();
        state.mark_failed(&IngestError::NoEnabledProviders);

        assert_eq!(state.current_phase, SagaPhase::Failed);
        assert_eq!(state.status, SagaStatus::Failed);
        assert_eq!(state.failure.as_ref().unwrap().phase, SagaPhase::Discovering);
        assert!(state.advance_to(SagaPhase::Completed).is_err());
    }

    #[test]
    fn test_failure_context_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let error = IngestError::Config(crate::ConfigError::Io(io));
        let failure = SagaFailure::from_error(SagaPhase::Processing, &error);

        assert!(failure.message.contains("Configuration error"));
        assert!(failure.context.iter().any(|c| c.contains("disk gone")));
    }

    #[test]
    fn test_checkpoint_snapshots_counters() {
        let mut state = state();
        state.data.duplicates.push("https://example.com/recipe/a".to_string());
        state.data.cursor = 3;
        state.checkpoint("processing-10");

        let cp = &state.checkpoints[0];
        assert_eq!(cp.label, "processing-10");
        assert_eq!(cp.counters.duplicates, 1);
        assert_eq!(cp.counters.cursor, 3);
    }

    #[test]
    fn test_metrics() {
        let mut state = state();
        for i in 0..3 {
            state.data.processed.push(ProcessedUrl {
                url: format!("https://example.com/recipe/{}", i),
                title: None,
                ingredient_count: 0,
                processed_at: Utc::now(),
            });
        }
        state.data.failed.push(FailedUrl::from_error(
            "https://example.com/recipe/x",
            &IngestError::NotFound {
                url: "https://example.com/recipe/x".to_string(),
            },
            ErrorClass::Permanent,
        ));

        let now = state.started_at + chrono::Duration::milliseconds(400);
        let metrics = state.compute_metrics(now);
        assert_eq!(metrics.processed_count, 3);
        assert_eq!(metrics.failed_count, 1);
        assert_eq!(metrics.elapsed_ms, 400);
        assert!((metrics.average_ms_per_item - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_failed_url_record() {
        let failed = FailedUrl::from_error(
            "https://example.com/recipe/x",
            &IngestError::Timeout {
                url: "https://example.com/recipe/x".to_string(),
            },
            ErrorClass::Transient,
        );
        assert_eq!(failed.error_type, "timeout");
        assert!(failed.transient);
    }

    #[test]
    fn test_state_json_roundtrip() {
        let mut state = state();
        state.advance_to(SagaPhase::Processing).unwrap();
        state.data.cursor = 2;

        let json = serde_json::to_string(&state).unwrap();
        let back: SagaState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
