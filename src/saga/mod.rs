//! Recipe-acquisition saga
//!
//! A saga is one provider run, identified by its correlation id. Its state
//! document is persisted after every unit of work so an interrupted run can
//! be resumed at the phase and cursor where it stopped.
//!
//! - `state`: phases, the persisted state document, checkpoints and metrics
//! - `batch`: the batch record written when a run completes
//! - `events`: notifications published while a run progresses
//! - `processor`: per-URL processing
//! - `orchestrator`: drives the phases

mod batch;
mod events;
mod orchestrator;
mod processor;
mod state;

pub use batch::RecipeBatch;
pub use events::{ChannelEventSink, EventError, EventSink, NullEventSink, SagaEvent, TracingEventSink};
pub use orchestrator::{SagaOptions, SagaOrchestrator, SagaStores};
pub use processor::{HttpRecipeProcessor, ProcessedRecipe, RecipeProcessor};
pub use state::{
    error_type, Checkpoint, CheckpointCounters, FailedUrl, FingerprintedUrl, ProcessedUrl,
    SagaData, SagaFailure, SagaMetrics, SagaPhase, SagaSettings, SagaState, SagaStatus,
    PHASE_ORDER,
};
