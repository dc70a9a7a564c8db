//! Integration tests for the saga orchestrator
//!
//! Provider sites are served by wiremock; storage is SQLite, on disk where a
//! test simulates a process restart.

use async_trait::async_trait;
use recipe_ingest::config::UserAgentConfig;
use recipe_ingest::providers::{DiscoveryStrategyKind, ProviderConfigCache, ProviderConfiguration};
use recipe_ingest::saga::{
    FingerprintedUrl, HttpRecipeProcessor, ProcessedRecipe, RecipeBatch, RecipeProcessor,
    SagaOptions, SagaOrchestrator, SagaPhase, SagaSettings, SagaState, SagaStatus, SagaStores,
};
use recipe_ingest::storage::{BatchStore, ProviderStore, SagaStore, SqliteStorage};
use recipe_ingest::{IngestError, RateLimiter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn user_agent() -> UserAgentConfig {
    UserAgentConfig {
        crawler_name: "TestIngest".to_string(),
        crawler_version: "1.0.0".to_string(),
        contact_url: "https://example.com/contact".to_string(),
        contact_email: "test@example.com".to_string(),
    }
}

fn provider(root_url: &str) -> ProviderConfiguration {
    ProviderConfiguration {
        provider_id: "site".to_string(),
        enabled: true,
        discovery_strategy: DiscoveryStrategyKind::Static,
        root_url: root_url.to_string(),
        batch_size: 10,
        time_window_minutes: 5,
        min_delay_seconds: 0,
        max_requests_per_minute: 600,
        retry_count: 0,
        request_timeout_seconds: 5,
        recipe_url_pattern: None,
        category_url_pattern: None,
        max_depth: 1,
        max_urls: 100,
    }
}

fn options() -> SagaOptions {
    SagaOptions {
        checkpoint_interval: 2,
        rate_limit_backoff: Duration::from_millis(1),
        discovery_retry_base_delay: Duration::from_millis(1),
        ..SagaOptions::default()
    }
}

fn orchestrator(
    storage: &Arc<SqliteStorage>,
    processor: Arc<dyn RecipeProcessor>,
) -> SagaOrchestrator {
    SagaOrchestrator::new(
        Arc::new(ProviderConfigCache::new(storage.clone())),
        SagaStores::shared(storage.clone()),
        Arc::new(RateLimiter::new()),
        processor,
        user_agent(),
    )
    .with_options(options())
}

fn recipe_page(title: &str) -> String {
    format!(
        r#"<html><head><title>{title}</title>
        <script type="application/ld+json">
        {{"@type": "Recipe", "name": "{title}", "recipeIngredient": ["2 tomatoes", "1 onion"]}}
        </script></head><body><h1>{title}</h1></body></html>"#
    )
}

/// Serves a root page linking to `/recipe/<slug>` for every slug
async fn mount_site(server: &MockServer, slugs: &[&str], missing: &[&str]) {
    let links: String = slugs
        .iter()
        .map(|s| format!(r#"<a href="/recipe/{}">{}</a>"#, s, s))
        .collect();
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(links, "text/html"))
        .mount(server)
        .await;

    for slug in slugs {
        let response = if missing.contains(slug) {
            ResponseTemplate::new(404)
        } else {
            ResponseTemplate::new(200).set_body_raw(recipe_page(slug), "text/html")
        };
        Mock::given(method("GET"))
            .and(path(format!("/recipe/{}", slug)))
            .respond_with(response)
            .mount(server)
            .await;
    }
}

/// Counts calls and optionally cancels or sleeps
struct ScriptedProcessor {
    calls: AtomicUsize,
    cancel_after: Option<(usize, CancellationToken)>,
    delay: Duration,
    /// Extra sleep on the n-th call only
    slow_call: Option<(usize, Duration)>,
}

impl ScriptedProcessor {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            cancel_after: None,
            delay: Duration::ZERO,
            slow_call: None,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecipeProcessor for ScriptedProcessor {
    async fn process(
        &self,
        item: &FingerprintedUrl,
        _provider: &ProviderConfiguration,
    ) -> recipe_ingest::Result<ProcessedRecipe> {
        let count = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((after, token)) = &self.cancel_after {
            if count == *after {
                token.cancel();
            }
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some((nth, delay)) = self.slow_call {
            if count == nth {
                tokio::time::sleep(delay).await;
            }
        }
        Ok(ProcessedRecipe {
            title: Some(item.url.clone()),
            ingredient_codes: Vec::new(),
        })
    }
}

#[tokio::test]
async fn test_end_to_end_run_over_http() {
    let server = MockServer::start().await;
    mount_site(&server, &["pasta", "stew", "gone"], &["gone"]).await;

    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    storage
        .upsert_provider(&provider(&format!("{}/", server.uri())))
        .unwrap();

    let orchestrator = orchestrator(&storage, Arc::new(HttpRecipeProcessor::new(user_agent())));
    let state = orchestrator
        .start_processing("site", 10, Duration::from_secs(60), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(state.status, SagaStatus::Completed);
    assert_eq!(state.data.discovered.len(), 3);
    assert_eq!(state.data.processed.len(), 2);
    assert_eq!(state.data.failed.len(), 1);

    let pasta = state
        .data
        .processed
        .iter()
        .find(|p| p.url.ends_with("/recipe/pasta"))
        .unwrap();
    assert_eq!(pasta.title.as_deref(), Some("pasta"));
    assert_eq!(pasta.ingredient_count, 2);

    let failed = &state.data.failed[0];
    assert!(failed.url.ends_with("/recipe/gone"));
    assert_eq!(failed.error_type, "not_found");
    assert!(!failed.transient);

    let batches = storage.list_batches("site").unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].processed_count, 2);
    assert_eq!(batches[0].failed_count, 1);
    assert!(batches[0].is_complete());
}

#[tokio::test]
async fn test_repeat_run_skips_known_recipes() {
    let server = MockServer::start().await;
    mount_site(&server, &["pasta", "stew"], &[]).await;

    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    storage
        .upsert_provider(&provider(&format!("{}/", server.uri())))
        .unwrap();

    let processor = Arc::new(ScriptedProcessor::new());
    let orchestrator = orchestrator(&storage, processor.clone());
    let cancel = CancellationToken::new();

    let first = orchestrator
        .start_processing("site", 10, Duration::from_secs(60), &cancel)
        .await
        .unwrap();
    let second = orchestrator
        .start_processing("site", 10, Duration::from_secs(60), &cancel)
        .await
        .unwrap();

    assert_eq!(first.data.processed.len(), 2);
    assert_eq!(second.data.duplicates.len(), 2);
    assert!(second.data.processed.is_empty());
    assert_eq!(processor.calls(), 2);

    let batches = storage.list_batches("site").unwrap();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches.iter().map(|b| b.skipped_count).sum::<usize>(), 2);
}

#[tokio::test]
async fn test_resume_after_restart_continues_from_cursor() {
    let server = MockServer::start().await;
    mount_site(&server, &["a", "b", "c", "d", "e"], &[]).await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("ingest.db");
    let cancel = CancellationToken::new();

    let correlation_id = {
        let storage = Arc::new(SqliteStorage::new(&db_path).unwrap());
        storage
            .upsert_provider(&provider(&format!("{}/", server.uri())))
            .unwrap();

        let processor = Arc::new(ScriptedProcessor {
            cancel_after: Some((2, cancel.clone())),
            ..ScriptedProcessor::new()
        });
        let result = orchestrator(&storage, processor)
            .start_processing("site", 10, Duration::from_secs(60), &cancel)
            .await;
        assert!(matches!(result, Err(IngestError::Cancelled)));

        let running = storage.list_sagas(Some(SagaStatus::Running)).unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].current_phase, SagaPhase::Processing);
        assert_eq!(running[0].data.cursor, 2);
        running[0].correlation_id
    };

    // A fresh process: new storage handle, new orchestrator
    let storage = Arc::new(SqliteStorage::new(&db_path).unwrap());
    let processor = Arc::new(ScriptedProcessor::new());
    let state = orchestrator(&storage, processor.clone())
        .resume_processing(correlation_id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(state.status, SagaStatus::Completed);
    assert_eq!(state.data.discovered.len(), 5);
    assert_eq!(state.data.processed.len(), 5);
    assert_eq!(processor.calls(), 3);
    assert!(state.data.duplicates.is_empty());
    assert_eq!(storage.list_batches("site").unwrap().len(), 1);
}

#[tokio::test]
async fn test_resume_in_persisting_writes_batch_once() {
    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    storage.upsert_provider(&provider("https://example.com/")).unwrap();

    let mut state = SagaState::new("site", SagaSettings::new(10, Duration::from_secs(60)));
    state.current_phase = SagaPhase::Persisting;
    let batch_id = Uuid::new_v4();
    state.data.batch_id = Some(batch_id);
    storage.insert_saga(&state).unwrap();

    // The batch was written before the crash, the phase change was not
    storage
        .insert_batch(&RecipeBatch::from_state(batch_id, &state))
        .unwrap();

    let resumed = orchestrator(&storage, Arc::new(ScriptedProcessor::new()))
        .resume_processing(state.correlation_id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(resumed.status, SagaStatus::Completed);
    let batches = storage.list_batches("site").unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].batch_id, batch_id);
}

#[tokio::test]
async fn test_time_window_stops_processing() {
    let server = MockServer::start().await;
    let slugs = ["a", "b", "c", "d", "e", "f", "g", "h"];
    mount_site(&server, &slugs, &[]).await;

    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    storage
        .upsert_provider(&provider(&format!("{}/", server.uri())))
        .unwrap();

    let processor = Arc::new(ScriptedProcessor {
        delay: Duration::from_millis(400),
        ..ScriptedProcessor::new()
    });
    let state = orchestrator(&storage, processor.clone())
        .start_processing("site", 100, Duration::from_secs(1), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(state.status, SagaStatus::Completed);
    assert!(state.data.processed.len() < slugs.len());
    assert!(processor.calls() < slugs.len());
    // Unprocessed items are neither failed nor duplicates
    assert!(state.data.failed.is_empty());
    assert!(state.data.cursor < state.data.fingerprinted.len());
}

#[tokio::test]
async fn test_batch_size_reached_before_slow_fetch() {
    let server = MockServer::start().await;
    let slugs = ["a", "b", "c", "d", "e", "f", "g", "h"];
    mount_site(&server, &slugs, &[]).await;

    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    storage
        .upsert_provider(&provider(&format!("{}/", server.uri())))
        .unwrap();

    // The sixth fetch would outlast the window but is never started
    let processor = Arc::new(ScriptedProcessor {
        slow_call: Some((6, Duration::from_secs(3))),
        ..ScriptedProcessor::new()
    });
    let state = orchestrator(&storage, processor.clone())
        .start_processing("site", 5, Duration::from_secs(2), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(state.status, SagaStatus::Completed);
    assert_eq!(state.data.processed.len(), 5);
    assert_eq!(state.data.cursor, 5);
    assert_eq!(processor.calls(), 5);
}

#[tokio::test]
async fn test_time_window_reached_before_batch_size() {
    let server = MockServer::start().await;
    let slugs = ["a", "b", "c", "d", "e", "f", "g", "h"];
    mount_site(&server, &slugs, &[]).await;

    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    storage
        .upsert_provider(&provider(&format!("{}/", server.uri())))
        .unwrap();

    let processor = Arc::new(ScriptedProcessor {
        slow_call: Some((3, Duration::from_secs(3))),
        ..ScriptedProcessor::new()
    });
    let state = orchestrator(&storage, processor.clone())
        .start_processing("site", 5, Duration::from_millis(500), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(state.status, SagaStatus::Completed);
    assert!(state.data.processed.len() <= 5);
    assert_eq!(state.data.processed.len(), 2);
    // The abandoned fetch does not advance the cursor
    assert_eq!(state.data.cursor, 2);
    assert_eq!(processor.calls(), 3);
    assert!(state.data.failed.is_empty());
}

#[tokio::test]
async fn test_leftovers_of_small_batch_are_processed_next_run() {
    let server = MockServer::start().await;
    mount_site(&server, &["a", "b", "c"], &[]).await;

    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    storage
        .upsert_provider(&provider(&format!("{}/", server.uri())))
        .unwrap();

    let processor = Arc::new(ScriptedProcessor::new());
    let orchestrator = orchestrator(&storage, processor.clone());
    let cancel = CancellationToken::new();

    let first = orchestrator
        .start_processing("site", 1, Duration::from_secs(60), &cancel)
        .await
        .unwrap();
    let second = orchestrator
        .start_processing("site", 10, Duration::from_secs(60), &cancel)
        .await
        .unwrap();

    assert_eq!(first.data.processed.len(), 1);
    assert_eq!(second.data.processed.len(), 2);
    assert_eq!(second.data.duplicates.len(), 1);
    assert_eq!(processor.calls(), 3);
}

#[tokio::test]
async fn test_unavailable_recipe_is_fetched_again_next_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/recipe/x"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_site(&server, &["x"], &[]).await;

    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    storage
        .upsert_provider(&provider(&format!("{}/", server.uri())))
        .unwrap();

    let orchestrator = orchestrator(&storage, Arc::new(HttpRecipeProcessor::new(user_agent())));
    let cancel = CancellationToken::new();

    let first = orchestrator
        .start_processing("site", 10, Duration::from_secs(60), &cancel)
        .await
        .unwrap();
    assert!(first.data.processed.is_empty());
    assert_eq!(first.data.failed.len(), 1);
    assert_eq!(first.data.failed[0].error_type, "http_status");
    assert!(first.data.failed[0].transient);

    let second = orchestrator
        .start_processing("site", 10, Duration::from_secs(60), &cancel)
        .await
        .unwrap();
    assert!(second.data.duplicates.is_empty());
    assert_eq!(second.data.processed.len(), 1);
    assert!(second.data.processed[0].url.ends_with("/recipe/x"));
    assert_eq!(second.data.processed[0].title.as_deref(), Some("x"));
}

#[tokio::test]
async fn test_root_failure_marks_saga_failed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    storage
        .upsert_provider(&provider(&format!("{}/", server.uri())))
        .unwrap();

    let result = orchestrator(&storage, Arc::new(ScriptedProcessor::new()))
        .start_processing("site", 10, Duration::from_secs(60), &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(IngestError::NotFound { .. })));

    let failed = storage.list_sagas(Some(SagaStatus::Failed)).unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].current_phase, SagaPhase::Failed);
    assert_eq!(
        failed[0].failure.as_ref().map(|f| f.phase),
        Some(SagaPhase::Discovering)
    );
    assert!(storage.list_batches("site").unwrap().is_empty());
}
