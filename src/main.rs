//! Recipe-Ingest main entry point
//!
//! Command-line interface for running and resuming recipe-acquisition sagas.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use recipe_ingest::config::{load_config_with_hash, Config};
use recipe_ingest::ingredients::TableIngredientNormalizer;
use recipe_ingest::providers::{ProviderConfigCache, ProviderConfiguration};
use recipe_ingest::saga::{
    HttpRecipeProcessor, SagaOptions, SagaOrchestrator, SagaState, SagaStatus, SagaStores,
};
use recipe_ingest::storage::{open_storage, ProviderStore, SagaStore, SqliteStorage};
use recipe_ingest::{IngestError, RateLimiter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Recipe-Ingest: resumable recipe acquisition
///
/// Discovers recipe URLs on provider websites, skips recipes that were
/// already ingested and processes the rest under per-provider rate limits.
/// Interrupted runs can be resumed where they stopped.
#[derive(Parser, Debug)]
#[command(name = "recipe-ingest")]
#[command(version = "1.0.0")]
#[command(about = "Resumable recipe acquisition", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, value_name = "CONFIG", default_value = "recipe-ingest.toml")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a saga for each selected provider (all enabled providers by default)
    Run {
        /// Provider to run; may be repeated
        #[arg(short, long = "provider", value_name = "ID")]
        providers: Vec<String>,
    },

    /// Resume an interrupted saga
    Resume {
        /// Correlation id of the saga
        #[arg(value_name = "ID")]
        correlation_id: Uuid,
    },

    /// Show the saved state of a saga
    Status {
        #[arg(value_name = "ID")]
        correlation_id: Uuid,
    },

    /// List saved sagas
    List {
        /// Only sagas that can still be resumed
        #[arg(long)]
        incomplete: bool,
    },

    /// List configured providers
    Providers,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    let storage = Arc::new(open_storage(Path::new(&config.ingest.database_path))?);

    match cli.command {
        Command::Run { providers } => handle_run(&config, storage, providers).await,
        Command::Resume { correlation_id } => handle_resume(&config, storage, correlation_id).await,
        Command::Status { correlation_id } => handle_status(&storage, correlation_id),
        Command::List { incomplete } => handle_list(&storage, incomplete),
        Command::Providers => handle_providers(&config, &storage),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("recipe_ingest=info,warn"),
            1 => EnvFilter::new("recipe_ingest=debug,info"),
            2 => EnvFilter::new("recipe_ingest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Writes the configured providers to the store and warms the cache
///
/// Fails fast when a provider entry is invalid or nothing is enabled.
fn bootstrap_providers(
    config: &Config,
    storage: &Arc<SqliteStorage>,
) -> anyhow::Result<Arc<ProviderConfigCache>> {
    for entry in &config.providers {
        let provider = ProviderConfiguration::try_from(entry)?;
        storage.upsert_provider(&provider)?;
    }

    let cache = Arc::new(ProviderConfigCache::with_ttl(
        storage.clone(),
        Duration::from_secs(config.ingest.cache_ttl_seconds),
    ));
    cache.load_configurations()?;
    Ok(cache)
}

fn build_orchestrator(
    config: &Config,
    storage: &Arc<SqliteStorage>,
    providers: Arc<ProviderConfigCache>,
) -> anyhow::Result<SagaOrchestrator> {
    let processor = Arc::new(HttpRecipeProcessor::new(config.user_agent.clone()));
    let normalizer = Arc::new(TableIngredientNormalizer::new(&config.ingredient_mappings));

    let orchestrator = SagaOrchestrator::new(
        providers,
        SagaStores::shared(storage.clone()),
        Arc::new(RateLimiter::new()),
        processor,
        config.user_agent.clone(),
    )
    .with_normalizer(normalizer)
    .with_options(SagaOptions::from(&config.ingest));

    #[cfg(feature = "headless")]
    let orchestrator = match recipe_ingest::discovery::ChromeRenderer::launch() {
        Ok(renderer) => orchestrator.with_renderer(Arc::new(renderer)),
        Err(e) => {
            tracing::warn!("Headless browser unavailable: {}", e);
            orchestrator
        }
    };

    Ok(orchestrator)
}

/// Cancels the token on Ctrl-C so running sagas save and stop
fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current item");
            cancel.cancel();
        }
    });
}

/// Handles `run`: one saga per provider, concurrently
async fn handle_run(
    config: &Config,
    storage: Arc<SqliteStorage>,
    selected: Vec<String>,
) -> anyhow::Result<()> {
    let cache = bootstrap_providers(config, &storage)?;

    let provider_ids: Vec<String> = if selected.is_empty() {
        cache
            .get_all_enabled()?
            .iter()
            .map(|p| p.provider_id.clone())
            .collect()
    } else {
        for id in &selected {
            cache.require(id)?;
        }
        selected
    };

    let orchestrator = Arc::new(build_orchestrator(config, &storage, cache)?);
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let mut sagas = JoinSet::new();
    for provider_id in provider_ids {
        let orchestrator = orchestrator.clone();
        let cancel = cancel.clone();
        sagas.spawn(async move {
            let result = orchestrator.start_for_provider(&provider_id, &cancel).await;
            (provider_id, result)
        });
    }

    let mut failures = 0;
    while let Some(joined) = sagas.join_next().await {
        let (provider_id, result) = joined?;
        match result {
            Ok(state) => print_summary(&state),
            Err(IngestError::Cancelled) => {
                println!("{}: cancelled, resume with `recipe-ingest resume <ID>`", provider_id);
            }
            Err(e) => {
                failures += 1;
                println!("{}: failed: {}", provider_id, e);
            }
        }
    }

    if failures > 0 {
        bail!("{} saga(s) failed", failures);
    }
    Ok(())
}

/// Handles `resume`
async fn handle_resume(
    config: &Config,
    storage: Arc<SqliteStorage>,
    correlation_id: Uuid,
) -> anyhow::Result<()> {
    let cache = bootstrap_providers(config, &storage)?;
    let orchestrator = build_orchestrator(config, &storage, cache)?;

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let state = orchestrator.resume_processing(correlation_id, &cancel).await?;
    print_summary(&state);
    Ok(())
}

/// Handles `status`
fn handle_status(storage: &SqliteStorage, correlation_id: Uuid) -> anyhow::Result<()> {
    let Some(state) = storage.get_saga(correlation_id)? else {
        bail!(IngestError::SagaNotFound(correlation_id.to_string()));
    };

    println!("=== Saga {} ===\n", state.correlation_id);
    println!("Provider:    {}", state.provider_id);
    println!("Status:      {}", state.status);
    println!("Phase:       {}", state.current_phase);
    println!("Started:     {}", state.started_at.to_rfc3339());
    if let Some(finished) = state.finished_at {
        println!("Finished:    {}", finished.to_rfc3339());
    }
    println!(
        "Settings:    batch size {}, window {:?}",
        state.settings.batch_size,
        state.settings.time_window()
    );

    let counters = state.counters();
    println!("\nDiscovered:    {}", counters.discovered);
    println!("Fingerprinted: {}", counters.fingerprinted);
    println!("Duplicates:    {}", counters.duplicates);
    println!("Processed:     {}", counters.processed);
    println!("Failed:        {}", counters.failed);
    println!("Cursor:        {}", counters.cursor);

    if let Some(failure) = &state.failure {
        println!("\nFailure in {}: {}", failure.phase, failure.message);
        for line in &failure.context {
            println!("  caused by: {}", line);
        }
    }

    if !state.checkpoints.is_empty() {
        println!("\nCheckpoints:");
        for checkpoint in &state.checkpoints {
            println!(
                "  {} {}",
                checkpoint.created_at.format("%Y-%m-%d %H:%M:%S"),
                checkpoint.label
            );
        }
    }

    Ok(())
}

/// Handles `list`
fn handle_list(storage: &SqliteStorage, incomplete: bool) -> anyhow::Result<()> {
    let filter = incomplete.then_some(SagaStatus::Running);
    let sagas = storage.list_sagas(filter)?;

    if sagas.is_empty() {
        println!("No sagas found");
        return Ok(());
    }

    for saga in &sagas {
        println!(
            "{}  {:<10} {:<15} {:<20} processed {}",
            saga.correlation_id,
            saga.status,
            saga.current_phase,
            saga.provider_id,
            saga.data.processed.len()
        );
    }
    Ok(())
}

/// Handles `providers`
fn handle_providers(config: &Config, storage: &Arc<SqliteStorage>) -> anyhow::Result<()> {
    for entry in &config.providers {
        storage.upsert_provider(&ProviderConfiguration::try_from(entry)?)?;
    }

    for provider in storage.list_providers()? {
        println!(
            "{:<20} {:<8} {:<8} {}",
            provider.provider_id,
            if provider.enabled { "enabled" } else { "disabled" },
            provider.discovery_strategy,
            provider.root_url
        );
    }
    Ok(())
}

fn print_summary(state: &SagaState) {
    let metrics = state.metrics.clone().unwrap_or_else(|| state.compute_metrics(chrono::Utc::now()));
    println!(
        "{}: saga {} {} (processed {}, duplicates {}, failed {}, {} ms)",
        state.provider_id,
        state.correlation_id,
        state.status,
        metrics.processed_count,
        metrics.duplicate_count,
        metrics.failed_count,
        metrics.elapsed_ms
    );
}
