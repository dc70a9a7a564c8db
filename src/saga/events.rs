//! Saga notifications
//!
//! Publishing is fire-and-forget: sinks must not block, and a failed publish
//! is logged by the orchestrator and otherwise ignored.

use crate::retry::ErrorClass;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SagaEvent {
    /// A run persisted its batch
    BatchCompleted {
        batch_id: Uuid,
        correlation_id: Uuid,
        provider_id: String,
        processed: usize,
        skipped: usize,
        failed: usize,
        timestamp: DateTime<Utc>,
    },

    /// Processing one URL failed; the run continues
    ProcessingError {
        correlation_id: Uuid,
        provider_id: String,
        url: String,
        error: String,
        classification: ErrorClass,
        timestamp: DateTime<Utc>,
    },

    /// An ingredient code had no canonical mapping
    MappingMissing {
        provider_id: String,
        url: String,
        code: String,
        timestamp: DateTime<Utc>,
    },
}

impl SagaEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SagaEvent::BatchCompleted { .. } => "batch_completed",
            SagaEvent::ProcessingError { .. } => "processing_error",
            SagaEvent::MappingMissing { .. } => "mapping_missing",
        }
    }
}

#[derive(Debug, Error)]
pub enum EventError {
    #[error("Event receiver dropped")]
    Closed,

    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Receives saga notifications
pub trait EventSink: Send + Sync {
    /// Publishes an event without blocking
    fn publish(&self, event: SagaEvent) -> Result<(), EventError>;
}

/// Writes events to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn publish(&self, event: SagaEvent) -> Result<(), EventError> {
        let payload = serde_json::to_string(&event)?;
        tracing::info!(event = event.name(), %payload, "Saga event");
        Ok(())
    }
}

/// Forwards events over an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    sender: UnboundedSender<SagaEvent>,
}

impl ChannelEventSink {
    /// Creates a sink and the receiver its events arrive on
    pub fn channel() -> (Self, UnboundedReceiver<SagaEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelEventSink {
    fn publish(&self, event: SagaEvent) -> Result<(), EventError> {
        self.sender.send(event).map_err(|_| EventError::Closed)
    }
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn publish(&self, _event: SagaEvent) -> Result<(), EventError> {
        Ok(())
    }
}
