// /////////////////////////////////////////////////////////////////////////////
// Queue Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Process Entry Point
//!
//! Wires the bootstrap layer (CLI parsing, signals, shutdown
//! coordination) to the runtime layer (store, registry, worker pools,
//! recovery manager, control API). `serve` starts the long-lived
//! pipeline and blocks until a shutdown signal arrives; every other
//! subcommand is a single [`ControlApi`] call whose result is printed
//! and turned into a process exit code.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use queue_bootstrap::shutdown::{ShutdownCoordinator, DEFAULT_GRACE_PERIOD_SECS};
use queue_bootstrap::signals::create_signal_handler;
use queue_bootstrap::{result_to_exit_code, ValidatedCommand};

use queue_domain::entities::queue_setting::keys;
use queue_domain::entities::{EndpointBinding, NewItem};
use queue_domain::error::QueueError;
use queue_domain::repositories::ItemRepository;
use queue_domain::value_objects::{ProviderKind, Stage};

use queue_runtime::application::settings::read_u64;
use queue_runtime::infrastructure::endpoint_registry::EndpointRegistry;
use queue_runtime::infrastructure::llm_client::RemoteEndpointHandler;
use queue_runtime::infrastructure::metrics::MetricsService;
use queue_runtime::infrastructure::repositories::schema::initialize_database;
use queue_runtime::infrastructure::config::AppConfig;
use queue_runtime::{ControlApi, RecoveryManager, SqliteItemRepository, StageWorkerPool};

/// Every fallible step between process start and the running
/// application folds into this one type, so [`result_to_exit_code`] has
/// a single `std::error::Error` to classify.
#[derive(Debug, Error)]
enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> std::process::ExitCode {
    let cli = match queue_bootstrap::bootstrap_cli() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("Error: {e}");
            return queue_bootstrap::ExitCode::UsageError.into();
        }
    };

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(threads) = cli.worker_threads {
        builder.worker_threads(threads);
    }
    let runtime = match builder.build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start tokio runtime: {e}");
            return queue_bootstrap::ExitCode::OsError.into();
        }
    };

    let result = runtime.block_on(run(cli));
    result_to_exit_code(result)
}

async fn run(cli: queue_bootstrap::ValidatedCli) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;
    if let Some(database_url) = cli.database_url {
        config.database_url = database_url;
    }
    if cli.verbose {
        config.log_level = "debug".to_string();
    }
    init_logging(&config.log_level);

    let platform = queue_bootstrap::platform::create_platform();
    tracing::info!(
        platform = platform.platform_name(),
        cpu_count = platform.cpu_count(),
        "starting queue orchestrator"
    );

    let pool = initialize_database(&config.database_url).await?;
    let repository: Arc<dyn ItemRepository> = Arc::new(SqliteItemRepository::new(pool));
    let registry = Arc::new(EndpointRegistry::load(repository.clone()).await?);
    let metrics = Arc::new(MetricsService::new()?);

    let tool_call_cap = read_u64(repository.as_ref(), keys::TOOL_CALL_CAP, 8) as u32;
    let mut handlers = HashMap::new();
    for stage in Stage::ORDER {
        let handler = Arc::new(RemoteEndpointHandler::new(stage, registry.clone(), tool_call_cap));
        handlers.insert(stage, handler);
    }

    let control = ControlApi::new(repository.clone(), registry.clone(), metrics.clone(), handlers.clone());

    match cli.command {
        ValidatedCommand::Serve => serve(config, repository, registry, metrics, handlers).await,
        other => run_control_command(&control, other).await,
    }
}

/// Start every stage worker pool plus the recovery manager, and block
/// until a shutdown signal arrives. Workers are given up to
/// [`DEFAULT_GRACE_PERIOD_SECS`] to drain in-flight attempts before the
/// process exits regardless.
async fn serve(
    config: AppConfig,
    repository: Arc<dyn ItemRepository>,
    registry: Arc<EndpointRegistry>,
    metrics: Arc<MetricsService>,
    handlers: HashMap<Stage, Arc<RemoteEndpointHandler>>,
) -> Result<(), AppError> {
    let web_search_rate = read_u64(repository.as_ref(), keys::WEB_SEARCH_RATE_PER_MINUTE, 30) as u32;
    let limiter = queue_runtime::infrastructure::tools::WebSearchLimiter::spawn(web_search_rate);

    let coordinator = ShutdownCoordinator::new(Duration::from_secs(DEFAULT_GRACE_PERIOD_SECS));
    let signal_coordinator = coordinator.clone();
    tokio::spawn(async move {
        let handler = create_signal_handler();
        handler
            .wait_for_signal(Box::new(move || signal_coordinator.initiate_shutdown()))
            .await;
    });

    let mut tasks = Vec::new();
    for stage in Stage::ORDER {
        let handler = handlers
            .get(&stage)
            .cloned()
            .ok_or_else(|| AppError::Queue(QueueError::EndpointNotBound(stage.to_string())))?;
        let pool = StageWorkerPool::new(
            stage,
            repository.clone(),
            handler,
            registry.clone(),
            metrics.clone(),
            limiter.clone(),
            config.search_provider_url.clone(),
            config.search_provider_api_key_env.clone(),
            Duration::from_millis(config.poll_interval_ms),
            config.claim_batch_size,
        );
        let shutdown = coordinator.token();
        tasks.push(tokio::spawn(async move { pool.run(shutdown).await }));
    }

    let recovery = RecoveryManager::new(
        repository.clone(),
        metrics.clone(),
        Duration::from_secs(config.recovery_interval_seconds),
    );
    let recovery_shutdown = coordinator.token();
    tasks.push(tokio::spawn(async move { recovery.run(recovery_shutdown).await }));

    coordinator.token().cancelled().await;
    tracing::info!("shutdown signal received, draining stage workers");
    let drain = futures::future::join_all(tasks);
    if tokio::time::timeout(Duration::from_secs(DEFAULT_GRACE_PERIOD_SECS), drain).await.is_err() {
        tracing::warn!("grace period expired before every worker drained");
    }
    coordinator.complete_shutdown();

    Ok(())
}

/// Dispatch every one-shot operator command to [`ControlApi`] and print
/// its result. `Serve` never reaches here — it's handled by [`serve`].
async fn run_control_command(control: &ControlApi, command: ValidatedCommand) -> Result<(), AppError> {
    match command {
        ValidatedCommand::Serve => unreachable!("Serve is dispatched to serve() before this point"),
        ValidatedCommand::Ingest { source_id, title, author, body, source_url, priority } => {
            let item = control
                .ingest(NewItem {
                    source_id,
                    title,
                    author,
                    body,
                    source_url,
                    source_created_at: chrono::Utc::now(),
                    priority,
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&item).unwrap_or_else(|_| format!("{item:?}")));
        }
        ValidatedCommand::Pause { stage } => {
            let stage = parse_stage_opt(stage)?;
            let flag = control.pause(stage).await?;
            println!("paused: {}", flag.scope);
        }
        ValidatedCommand::Resume { stage } => {
            let stage = parse_stage_opt(stage)?;
            let flag = control.resume(stage).await?;
            println!("resumed: {}", flag.scope);
        }
        ValidatedCommand::Status => {
            let report = control.status().await?;
            println!("{}", serde_json::to_string_pretty(&report).unwrap_or_else(|_| "<unprintable>".to_string()));
        }
        ValidatedCommand::Stats => {
            let report = control.stats().await?;
            println!(
                "completed={} rejected={} fallback={}\n{}",
                report.completed, report.rejected, report.fallback, report.metrics_text
            );
        }
        ValidatedCommand::ListPending { stage, limit } => {
            let stage = parse_stage_opt(stage)?;
            let items = control.list_pending(stage, limit).await?;
            println!("{}", serde_json::to_string_pretty(&items).unwrap_or_else(|_| "<unprintable>".to_string()));
        }
        ValidatedCommand::ListRejected { limit } => {
            let items = control.list_rejected(limit).await?;
            println!("{}", serde_json::to_string_pretty(&items).unwrap_or_else(|_| "<unprintable>".to_string()));
        }
        ValidatedCommand::ListFallback { limit } => {
            let items = control.list_fallback(limit).await?;
            println!("{}", serde_json::to_string_pretty(&items).unwrap_or_else(|_| "<unprintable>".to_string()));
        }
        ValidatedCommand::History { item_id } => {
            let history = control.history(item_id).await?;
            println!("{}", serde_json::to_string_pretty(&history).unwrap_or_else(|_| "<unprintable>".to_string()));
        }
        ValidatedCommand::SetSetting { key, value } => {
            control.set_setting(&key, &value).await?;
            println!("set {key}={value}");
        }
        ValidatedCommand::SetEndpoint { stage, provider, url, model, concurrency, timeout_secs, secret_env } => {
            let stage = parse_stage(&stage)?;
            let provider = ProviderKind::parse(&provider)
                .ok_or_else(|| AppError::Queue(QueueError::InvalidConfiguration(format!("unknown provider kind: {provider}"))))?;
            control
                .set_endpoint(EndpointBinding {
                    stage,
                    provider,
                    url,
                    model,
                    timeout: Duration::from_secs(timeout_secs),
                    secret_env_var: secret_env,
                    concurrency_cap: concurrency,
                    updated_at: chrono::Utc::now(),
                })
                .await?;
            println!("endpoint bound for {stage}");
        }
        ValidatedCommand::ProbeEndpoint { stage } => {
            let stage = parse_stage(&stage)?;
            let models = control.probe_endpoint(stage).await?;
            println!("{}", models.join("\n"));
        }
        ValidatedCommand::Stuck => {
            let report = control.stuck_report().await?;
            for (stage, claimed) in report {
                println!("{stage}: {claimed} claimed");
            }
        }
        ValidatedCommand::ResetStuck => {
            let recovered = control.reset_stuck().await;
            for (stage, ids) in recovered {
                if !ids.is_empty() {
                    println!("{stage}: reclaimed {ids:?}");
                }
            }
        }
        ValidatedCommand::ReloadEndpoints => {
            control.reload_endpoints().await?;
            println!("endpoint registry reloaded");
        }
    }
    Ok(())
}

fn parse_stage(s: &str) -> Result<Stage, AppError> {
    Stage::parse(s).ok_or_else(|| AppError::Queue(QueueError::InvalidConfiguration(format!("unknown stage: {s}"))))
}

fn parse_stage_opt(s: Option<String>) -> Result<Option<Stage>, AppError> {
    s.map(|s| parse_stage(&s)).transpose()
}
