//! Saga orchestrator
//!
//! Drives one provider run through its phases:
//!
//! 1. **Discovering** - enumerate recipe URLs with the provider's strategy
//! 2. **Fingerprinting** - drop URLs that an earlier run already settled
//! 3. **Processing** - fetch each remaining URL under the rate limit
//! 4. **Persisting** - write the batch and emit the completion event
//!
//! Phases run sequentially. The state document is saved after every phase,
//! after every fingerprinted or processed item, and at every named
//! checkpoint; the next unit of work starts only after the save returned.

use crate::config::{IngestConfig, UserAgentConfig};
use crate::discovery::{build_http_client, DiscoveryEngine, PageRenderer};
use crate::fingerprint::FingerprintService;
use crate::ingredients::IngredientNormalizer;
use crate::providers::{ProviderConfigCache, ProviderConfiguration};
use crate::rate_limit::RateLimiter;
use crate::retry::{classify, execute_with_retry, Backoff, RetryPolicy};
use crate::saga::{
    EventSink, FailedUrl, FingerprintedUrl, ProcessedUrl, RecipeBatch, RecipeProcessor, SagaEvent,
    SagaPhase, SagaSettings, SagaState, TracingEventSink, PHASE_ORDER,
};
use crate::storage::{BatchStore, FingerprintStore, SagaStore};
use crate::url::UrlClassifier;
use crate::{IngestError, Result};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Tunables of the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SagaOptions {
    /// Successfully processed items between named checkpoints
    pub checkpoint_interval: usize,
    /// Wait before the single rate-limit retry
    pub rate_limit_backoff: Duration,
    /// Delay before the first discovery retry; later delays grow from it
    pub discovery_retry_base_delay: Duration,
    /// Growth of the delay between discovery retries
    pub discovery_backoff: Backoff,
}

impl Default for SagaOptions {
    fn default() -> Self {
        Self {
            checkpoint_interval: 10,
            rate_limit_backoff: Duration::from_millis(500),
            discovery_retry_base_delay: Duration::from_millis(1000),
            discovery_backoff: Backoff::Exponential,
        }
    }
}

impl From<&IngestConfig> for SagaOptions {
    fn from(config: &IngestConfig) -> Self {
        Self {
            checkpoint_interval: config.checkpoint_interval.max(1),
            rate_limit_backoff: Duration::from_millis(config.rate_limit_backoff_ms),
            discovery_retry_base_delay: Duration::from_millis(config.discovery_retry_base_delay_ms),
            discovery_backoff: Backoff::Exponential,
        }
    }
}

/// The stores a saga writes to
#[derive(Clone)]
pub struct SagaStores {
    pub sagas: Arc<dyn SagaStore>,
    pub fingerprints: Arc<dyn FingerprintStore>,
    pub batches: Arc<dyn BatchStore>,
}

impl SagaStores {
    /// Uses one backend for every store
    pub fn shared<S>(storage: Arc<S>) -> Self
    where
        S: SagaStore + FingerprintStore + BatchStore + 'static,
    {
        Self {
            sagas: storage.clone(),
            fingerprints: storage.clone(),
            batches: storage,
        }
    }
}

/// Runs and resumes recipe-acquisition sagas
pub struct SagaOrchestrator {
    providers: Arc<ProviderConfigCache>,
    sagas: Arc<dyn SagaStore>,
    batches: Arc<dyn BatchStore>,
    fingerprints: FingerprintService,
    rate_limiter: Arc<RateLimiter>,
    processor: Arc<dyn RecipeProcessor>,
    user_agent: UserAgentConfig,
    events: Arc<dyn EventSink>,
    normalizer: Option<Arc<dyn IngredientNormalizer>>,
    renderer: Option<Arc<dyn PageRenderer>>,
    options: SagaOptions,
}

impl SagaOrchestrator {
    pub fn new(
        providers: Arc<ProviderConfigCache>,
        stores: SagaStores,
        rate_limiter: Arc<RateLimiter>,
        processor: Arc<dyn RecipeProcessor>,
        user_agent: UserAgentConfig,
    ) -> Self {
        Self {
            providers,
            sagas: stores.sagas,
            batches: stores.batches,
            fingerprints: FingerprintService::new(stores.fingerprints),
            rate_limiter,
            processor,
            user_agent,
            events: Arc::new(TracingEventSink),
            normalizer: None,
            renderer: None,
            options: SagaOptions::default(),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_normalizer(mut self, normalizer: Arc<dyn IngredientNormalizer>) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn with_options(mut self, options: SagaOptions) -> Self {
        self.options = options;
        self
    }

    /// Starts a new saga for a provider
    ///
    /// # Arguments
    ///
    /// * `provider_id` - Provider to run
    /// * `batch_size` - Successfully processed items after which processing stops
    /// * `time_window` - Time after which processing stops
    /// * `cancel` - Cooperative cancellation signal
    ///
    /// # Returns
    ///
    /// * `Ok(SagaState)` - The completed saga
    /// * `Err(IngestError::Cancelled)` - Cancelled; the saga is saved and resumable
    /// * `Err(_)` - The saga was marked failed and saved
    pub async fn start_processing(
        &self,
        provider_id: &str,
        batch_size: usize,
        time_window: Duration,
        cancel: &CancellationToken,
    ) -> Result<SagaState> {
        let state = SagaState::new(provider_id, SagaSettings::new(batch_size, time_window));
        self.sagas.insert_saga(&state)?;

        tracing::info!(
            provider = provider_id,
            saga = %state.correlation_id,
            batch_size,
            time_window_ms = state.settings.time_window_ms,
            "Saga started"
        );

        self.execute(state, cancel).await
    }

    /// Starts a saga with the provider's configured batch size and time window
    pub async fn start_for_provider(
        &self,
        provider_id: &str,
        cancel: &CancellationToken,
    ) -> Result<SagaState> {
        let config = self.providers.require(provider_id)?;
        self.start_processing(
            provider_id,
            config.batch_size as usize,
            config.time_window(),
            cancel,
        )
        .await
    }

    /// Resumes a saved, non-terminal saga at its current phase
    ///
    /// Phases completed before the interruption are not repeated; a partly
    /// processed list continues from the saved cursor.
    pub async fn resume_processing(
        &self,
        correlation_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<SagaState> {
        let state = self
            .sagas
            .get_saga(correlation_id)?
            .ok_or_else(|| IngestError::SagaNotFound(correlation_id.to_string()))?;

        if state.is_terminal() {
            return Err(IngestError::SagaTerminal {
                correlation_id: correlation_id.to_string(),
                status: state.status,
            });
        }

        tracing::info!(
            provider = %state.provider_id,
            saga = %state.correlation_id,
            phase = %state.current_phase,
            cursor = state.data.cursor,
            "Resuming saga"
        );

        self.execute(state, cancel).await
    }

    async fn execute(&self, mut state: SagaState, cancel: &CancellationToken) -> Result<SagaState> {
        match self.run_phases(&mut state, cancel).await {
            Ok(()) => Ok(state),
            Err(IngestError::Cancelled) => {
                self.save(&state)?;
                tracing::warn!(
                    provider = %state.provider_id,
                    saga = %state.correlation_id,
                    phase = %state.current_phase,
                    "Saga cancelled; saved for resumption"
                );
                Err(IngestError::Cancelled)
            }
            Err(error) => {
                let phase = state.current_phase;
                state.mark_failed(&error);
                tracing::error!(
                    provider = %state.provider_id,
                    saga = %state.correlation_id,
                    %phase,
                    classification = %classify(&error),
                    "Saga failed: {}",
                    error
                );
                if let Err(save_error) = self.save(&state) {
                    tracing::error!(
                        saga = %state.correlation_id,
                        "Failed to save failed saga: {}",
                        save_error
                    );
                }
                Err(error)
            }
        }
    }

    async fn run_phases(&self, state: &mut SagaState, cancel: &CancellationToken) -> Result<()> {
        let config = self.providers.require(&state.provider_id)?;
        self.rate_limiter.configure(
            &config.provider_id,
            config.max_requests_per_minute,
            config.min_delay(),
        );

        let start = state
            .current_phase
            .index()
            .ok_or(IngestError::InvalidPhaseTransition {
                from: state.current_phase,
                to: state.current_phase,
            })?;

        for phase in &PHASE_ORDER[start..] {
            match phase {
                SagaPhase::Discovering => self.discover(state, &config, cancel).await?,
                SagaPhase::Fingerprinting => self.fingerprint(state, cancel)?,
                SagaPhase::Processing => self.process(state, &config, cancel).await?,
                SagaPhase::Persisting => self.persist(state)?,
                SagaPhase::Completed | SagaPhase::Failed => {}
            }
        }

        Ok(())
    }

    async fn discover(
        &self,
        state: &mut SagaState,
        config: &ProviderConfiguration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let classifier = UrlClassifier::new(self.providers.url_patterns(config));
        let client = build_http_client(&self.user_agent, config.request_timeout())?;
        let engine =
            DiscoveryEngine::for_provider(config, classifier, client, self.renderer.clone())?;

        let policy = RetryPolicy::new(
            config.retry_count,
            self.options.discovery_retry_base_delay,
            self.options.discovery_backoff,
        );

        let engine = &engine;
        let discovered = execute_with_retry(&policy, cancel, move || {
            engine.discover_recipe_urls(
                &config.root_url,
                &config.provider_id,
                config.max_depth,
                config.max_urls as usize,
                cancel,
            )
        })
        .await?;

        tracing::info!(
            provider = %state.provider_id,
            saga = %state.correlation_id,
            phase = %SagaPhase::Discovering,
            discovered = discovered.len(),
            "Discovery complete"
        );

        state.data.discovered = discovered;
        self.finish_phase(state, SagaPhase::Fingerprinting)
    }

    fn fingerprint(&self, state: &mut SagaState, cancel: &CancellationToken) -> Result<()> {
        let mut seen: HashSet<String> = state
            .data
            .fingerprinted
            .iter()
            .map(|f| f.normalized_url.clone())
            .collect();

        while state.data.fingerprint_cursor < state.data.discovered.len() {
            if cancel.is_cancelled() {
                return Err(IngestError::Cancelled);
            }

            let url = state.data.discovered[state.data.fingerprint_cursor].url.clone();

            match self
                .fingerprints
                .check(&state.provider_id, &url, state.correlation_id)
            {
                Ok(check) => {
                    let first_in_run = seen.insert(check.normalized_url().to_string());
                    if check.is_duplicate() || !first_in_run {
                        tracing::debug!(saga = %state.correlation_id, url = %url, "Skipping duplicate");
                        state.data.duplicates.push(url);
                    } else {
                        state.data.fingerprinted.push(FingerprintedUrl {
                            url,
                            normalized_url: check.normalized_url().to_string(),
                            fingerprint: check.fingerprint().to_string(),
                        });
                    }
                }
                Err(error @ IngestError::UrlError(_)) => {
                    let classification = classify(&error);
                    tracing::warn!(
                        provider = %state.provider_id,
                        saga = %state.correlation_id,
                        phase = %SagaPhase::Fingerprinting,
                        %classification,
                        url = %url,
                        "Cannot fingerprint URL: {}",
                        error
                    );
                    state
                        .data
                        .failed
                        .push(FailedUrl::from_error(&url, &error, classification));
                }
                Err(error) => return Err(error),
            }

            state.data.fingerprint_cursor += 1;
            self.save(state)?;
        }

        tracing::info!(
            provider = %state.provider_id,
            saga = %state.correlation_id,
            phase = %SagaPhase::Fingerprinting,
            fingerprinted = state.data.fingerprinted.len(),
            duplicates = state.data.duplicates.len(),
            "Fingerprinting complete"
        );

        self.finish_phase(state, SagaPhase::Processing)
    }

    async fn process(
        &self,
        state: &mut SagaState,
        config: &ProviderConfiguration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let phase_start = Instant::now();
        let time_window = state.settings.time_window();
        let batch_size = state.settings.batch_size;

        while state.data.cursor < state.data.fingerprinted.len() {
            if state.data.processed.len() >= batch_size {
                tracing::info!(saga = %state.correlation_id, batch_size, "Batch size reached");
                break;
            }

            let remaining = time_window.saturating_sub(phase_start.elapsed());
            if remaining.is_zero() {
                tracing::info!(saga = %state.correlation_id, "Time window elapsed");
                break;
            }

            if cancel.is_cancelled() {
                return Err(IngestError::Cancelled);
            }

            let item = state.data.fingerprinted[state.data.cursor].clone();
            self.acquire_permit(&config.provider_id, cancel).await?;

            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(IngestError::Cancelled),
                _ = tokio::time::sleep(remaining) => None,
                outcome = self.processor.process(&item, config) => Some(outcome),
            };

            let Some(outcome) = outcome else {
                tracing::info!(
                    saga = %state.correlation_id,
                    url = %item.url,
                    "Time window elapsed during fetch"
                );
                break;
            };

            let (succeeded, settled) = match outcome {
                Ok(recipe) => {
                    self.normalize_ingredients(&state.provider_id, &item.url, &recipe.ingredient_codes);
                    state.data.processed.push(ProcessedUrl {
                        url: item.url.clone(),
                        title: recipe.title,
                        ingredient_count: recipe.ingredient_codes.len(),
                        processed_at: Utc::now(),
                    });
                    tracing::debug!(saga = %state.correlation_id, url = %item.url, "Processed");
                    (true, true)
                }
                Err(IngestError::Cancelled) => return Err(IngestError::Cancelled),
                Err(error) => {
                    let transient = self.record_failure(state, &item.url, &error);
                    (false, !transient)
                }
            };

            // Only settled URLs become duplicates for later runs
            if settled {
                self.fingerprints.record(
                    &state.provider_id,
                    &item.normalized_url,
                    &item.fingerprint,
                    state.correlation_id,
                )?;
            }

            state.data.cursor += 1;

            let processed = state.data.processed.len();
            if succeeded && processed % self.options.checkpoint_interval.max(1) == 0 {
                state.checkpoint(format!("processed-{}", processed));
            }

            self.save(state)?;
        }

        tracing::info!(
            provider = %state.provider_id,
            saga = %state.correlation_id,
            phase = %SagaPhase::Processing,
            processed = state.data.processed.len(),
            failed = state.data.failed.len(),
            "Processing complete"
        );

        self.finish_phase(state, SagaPhase::Persisting)
    }

    /// Takes a rate-limit permit, retrying once after the backoff
    ///
    /// Proceeds without a permit if the retry fails too.
    async fn acquire_permit(&self, provider_id: &str, cancel: &CancellationToken) -> Result<()> {
        if self.rate_limiter.try_acquire(provider_id) {
            return Ok(());
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(IngestError::Cancelled),
            _ = tokio::time::sleep(self.options.rate_limit_backoff) => {}
        }

        if !self.rate_limiter.try_acquire(provider_id) {
            tracing::debug!(provider = provider_id, "Rate limited; proceeding without permit");
        }
        Ok(())
    }

    /// Records a failed item and returns whether the failure was transient
    fn record_failure(&self, state: &mut SagaState, url: &str, error: &IngestError) -> bool {
        let classification = classify(error);
        tracing::warn!(
            provider = %state.provider_id,
            saga = %state.correlation_id,
            phase = %SagaPhase::Processing,
            %classification,
            url,
            "Processing failed: {}",
            error
        );

        let failed = FailedUrl::from_error(url, error, classification);
        self.publish(SagaEvent::ProcessingError {
            correlation_id: state.correlation_id,
            provider_id: state.provider_id.clone(),
            url: url.to_string(),
            error: failed.message.clone(),
            classification,
            timestamp: failed.timestamp,
        });
        let transient = failed.transient;
        state.data.failed.push(failed);
        transient
    }

    fn normalize_ingredients(&self, provider_id: &str, url: &str, codes: &[String]) {
        let Some(normalizer) = &self.normalizer else {
            return;
        };
        if codes.is_empty() {
            return;
        }

        let mapping = normalizer.normalize(provider_id, codes);
        let mut reported = HashSet::new();
        for code in codes {
            if matches!(mapping.get(code), Some(None)) && reported.insert(code) {
                self.publish(SagaEvent::MappingMissing {
                    provider_id: provider_id.to_string(),
                    url: url.to_string(),
                    code: code.clone(),
                    timestamp: Utc::now(),
                });
            }
        }
    }

    fn persist(&self, state: &mut SagaState) -> Result<()> {
        let batch_id = match state.data.batch_id {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4();
                state.data.batch_id = Some(id);
                self.save(state)?;
                id
            }
        };

        let mut batch = RecipeBatch::from_state(batch_id, state);
        batch.complete();
        self.batches.insert_batch(&batch)?;

        tracing::info!(
            provider = %state.provider_id,
            saga = %state.correlation_id,
            phase = %SagaPhase::Persisting,
            batch = %batch_id,
            processed = batch.processed_count,
            skipped = batch.skipped_count,
            failed = batch.failed_count,
            "Batch persisted"
        );

        self.publish(SagaEvent::BatchCompleted {
            batch_id,
            correlation_id: state.correlation_id,
            provider_id: state.provider_id.clone(),
            processed: batch.processed_count,
            skipped: batch.skipped_count,
            failed: batch.failed_count,
            timestamp: Utc::now(),
        });

        self.complete(state)
    }

    fn complete(&self, state: &mut SagaState) -> Result<()> {
        let metrics = state.compute_metrics(Utc::now());
        tracing::info!(
            provider = %state.provider_id,
            saga = %state.correlation_id,
            processed = metrics.processed_count,
            failed = metrics.failed_count,
            duplicates = metrics.duplicate_count,
            elapsed_ms = metrics.elapsed_ms,
            "Saga completed"
        );
        state.metrics = Some(metrics);
        self.finish_phase(state, SagaPhase::Completed)
    }

    fn finish_phase(&self, state: &mut SagaState, next: SagaPhase) -> Result<()> {
        let label = format!("{}-complete", state.current_phase);
        state.advance_to(next)?;
        state.checkpoint(label);
        self.save(state)
    }

    fn save(&self, state: &SagaState) -> Result<()> {
        self.sagas.save_saga(state)?;
        Ok(())
    }

    fn publish(&self, event: SagaEvent) {
        let name = event.name();
        if let Err(e) = self.events.publish(event) {
            tracing::warn!(event = name, "Failed to publish saga event: {}", e);
        }
    }
}
