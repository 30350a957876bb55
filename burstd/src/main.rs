// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::task::JoinSet;

use adapters::cli::Command;
use adapters::condor::CondorCli;
use adapters::db::{LedgerStore, SqliteStoreAdapter};
use adapters::deployment::{DeploymentClient, DeploymentDisabled};
use adapters::fs::LocalFilesystem;
use adapters::hook;
use adapters::sinks::{HttpAccounting, LogNotifier, NoopMetrics, TelegrafSocket, WebhookNotifier};
use adapters::storage::{S3Presigner, StorageDisabled};
use adapters::time::{SystemClock, TokioSleeper};
use app::ports::{
    ClockPort, InfrastructurePort, JobRecordStorePort, LocalFilesystemPort, MetricsPort,
    NotificationPort, UrlIssuerPort,
};
use app::types::Route;
use app::usecases::{
    CleanupHook, CompletionProcessor, CredentialRefresher, TranslationHook, WorkflowLoop,
};

mod adapters;
mod app;
mod config;
mod logging;

/// Process-wide adapters shared by every command.
struct Runtime {
    clock: Arc<dyn ClockPort>,
    fs: Arc<dyn LocalFilesystemPort>,
}

fn log_config_report(report: &config::ConfigReport) {
    match (&report.config_path, report.config_path_source) {
        (Some(path), Some(source)) => {
            tracing::debug!(
                path = %path.display(),
                source = source.as_str(),
                present = report.config_file_present,
                "config path"
            );
        }
        (Some(path), None) => {
            tracing::debug!(
                path = %path.display(),
                present = report.config_file_present,
                "config path"
            );
        }
        (None, _) => {
            tracing::debug!("config path: (none)");
        }
    }
    tracing::debug!(
        value = %report.database_path.value.display(),
        source = report.database_path.source.as_str(),
        "config database_path"
    );
    tracing::debug!(
        value = report.verbose.value,
        source = report.verbose.source.as_str(),
        "config verbose"
    );
    tracing::debug!(
        value = ?report.history_dir.value,
        source = report.history_dir.source.as_str(),
        "config spool.history_dir"
    );
}

/// One-shot passes fail the process when any record could not be handled.
fn pass_exit(failed: usize) -> ExitCode {
    if failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Hooks still answer batch jobs when no deployment service is configured.
fn infrastructure(config: &config::Config) -> anyhow::Result<Arc<dyn InfrastructurePort>> {
    if !config.deployment_configured() {
        tracing::debug!("deployment.url is empty, cloud deployments are disabled");
        return Ok(Arc::new(DeploymentDisabled));
    }
    let client = DeploymentClient::new(config.deployment_client()?)?;
    Ok(Arc::new(client))
}

async fn open_store(config: &config::Config, rt: &Runtime) -> anyhow::Result<Arc<SqliteStoreAdapter>> {
    config::ensure_database_dir(&config.database_path)?;
    let store = LedgerStore::open(&config.database_path)
        .await
        .with_context(|| format!("failed to open ledger {}", config.database_path.display()))?;
    Ok(Arc::new(SqliteStoreAdapter::new(
        store,
        rt.clock.clone(),
        config.claim_ttl(),
    )))
}

fn scheduler(config: &config::Config) -> Arc<dyn JobRecordStorePort> {
    Arc::new(CondorCli::new(config.condor_tools()))
}

async fn completion_processor(
    config: &config::Config,
    rt: &Runtime,
) -> anyhow::Result<CompletionProcessor> {
    let store = open_store(config, rt).await?;
    let accounting = Arc::new(HttpAccounting::new(config.accounting_client()?)?);
    let notifier: Arc<dyn NotificationPort> = match &config.notifications.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(
            url.clone(),
            config.notifications.sender.clone(),
            Duration::from_secs(config.notifications.timeout_secs),
        )?),
        None => Arc::new(LogNotifier),
    };
    let metrics: Arc<dyn MetricsPort> = match &config.metrics.socket {
        Some(path) => Arc::new(TelegrafSocket::new(path.clone())),
        None => Arc::new(NoopMetrics),
    };
    Ok(CompletionProcessor::new(
        scheduler(config),
        store,
        accounting,
        notifier,
        metrics,
        rt.fs.clone(),
        config.completion_settings(),
    ))
}

async fn workflow_loop(config: &config::Config, rt: &Runtime) -> anyhow::Result<WorkflowLoop> {
    let store = open_store(config, rt).await?;
    Ok(WorkflowLoop::new(
        scheduler(config),
        store,
        rt.fs.clone(),
        config.workflow_settings(),
    ))
}

/// Hooks report failure through the exit status and leave stdout empty.
fn hook_failure(hook_name: &str, err: impl std::fmt::Display) -> ExitCode {
    tracing::error!(hook = hook_name, "{err}");
    ExitCode::FAILURE
}

async fn run_translate(
    config: &config::Config,
    rt: &Runtime,
    route_override: Option<String>,
) -> anyhow::Result<ExitCode> {
    let text = match hook::read_stdin().await {
        Ok(text) => text,
        Err(err) => return Ok(hook_failure("translate", err)),
    };
    let input = match hook::parse_translate_input(&text) {
        Ok(input) => input,
        Err(err) => return Ok(hook_failure("translate", err)),
    };
    let Some(route_name) = route_override.or(input.route_name) else {
        return Ok(hook_failure("translate", "route ad has no name"));
    };
    let route = Route::parse(&route_name);

    let issuer: Arc<dyn UrlIssuerPort> = match config.storage_target() {
        Some(target) => Arc::new(S3Presigner::new(
            &target.url,
            config.s3_credentials(),
            rt.clock.clone(),
        )?),
        None => Arc::new(StorageDisabled),
    };
    let refresher = CredentialRefresher::new(
        issuer,
        rt.fs.clone(),
        rt.clock.clone(),
        config.refresh_policy(),
    );
    let translator = TranslationHook::new(
        infrastructure(config)?,
        refresher,
        rt.fs.clone(),
        rt.clock.clone(),
        config.deployment_defaults(),
    );

    match translator.translate(&route, input.job).await {
        Ok(translation) => {
            tracing::debug!(decision = ?translation.decision, "translation finished");
            hook::write_ad(&translation.ad).await?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => Ok(hook_failure("translate", err)),
    }
}

async fn run_cleanup(config: &config::Config, rt: &Runtime) -> anyhow::Result<ExitCode> {
    let text = match hook::read_stdin().await {
        Ok(text) => text,
        Err(err) => return Ok(hook_failure("cleanup", err)),
    };
    let ad = match hook::parse_job_input(&text) {
        Ok(ad) => ad,
        Err(err) => return Ok(hook_failure("cleanup", err)),
    };
    let cleaner = CleanupHook::new(
        infrastructure(config)?,
        Arc::new(TokioSleeper),
        rt.fs.clone(),
        config.deployment.retries,
    );
    match cleaner.cleanup(&ad).await {
        Ok(result) => {
            tracing::debug!(result = ?result, "cleanup finished");
            let code = u8::try_from(result.exit_code()).unwrap_or(1);
            Ok(ExitCode::from(code))
        }
        Err(err) => Ok(hook_failure("cleanup", err)),
    }
}

async fn run_daemon(config: &config::Config, rt: &Runtime) -> anyhow::Result<ExitCode> {
    let processor = completion_processor(config, rt).await?;
    let workflows = workflow_loop(config, rt).await?;
    let mut tasks: JoinSet<()> = JoinSet::new();

    let queue = processor.clone();
    let every = Duration::from_secs(config.completion.queue_interval_secs);
    tasks.spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = queue.process_queue().await {
                tracing::warn!(pass = "queue", "completion pass failed: {err}");
            }
        }
    });

    let history = processor;
    let every = Duration::from_secs(config.completion.history_interval_secs);
    tasks.spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = history.process_history().await {
                tracing::warn!(pass = "history", "completion pass failed: {err}");
            }
        }
    });

    let every = Duration::from_secs(config.workflows.interval_secs);
    tasks.spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = workflows.tick().await {
                tracing::warn!("workflow tick failed: {err}");
            }
        }
    });

    tracing::info!("daemon started");
    let mut terminate =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .context("failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for ctrl-c")?;
        }
        _ = terminate.recv() => {}
    }
    tracing::info!("shutting down");
    tasks.shutdown().await;
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let parsed = adapters::cli::parse_opts();
    let opts = parsed.opts;
    let config::LoadResult { config, report } = config::load_with_report(
        opts.config,
        config::Overrides {
            database_path: opts.database_path,
            verbose: parsed.verbose_override,
        },
    )?;
    logging::init(config.verbose, config.log_file(opts.command.name()));
    log_config_report(&report);

    let rt = Runtime {
        clock: Arc::new(SystemClock::new()),
        fs: Arc::new(LocalFilesystem::new()),
    };

    match opts.command {
        Command::Translate { route } => run_translate(&config, &rt, route).await,
        Command::Cleanup => run_cleanup(&config, &rt).await,
        Command::ProcessQueue => {
            let summary = completion_processor(&config, &rt)
                .await?
                .process_queue()
                .await?;
            Ok(pass_exit(summary.failed))
        }
        Command::ProcessHistory => {
            let summary = completion_processor(&config, &rt)
                .await?
                .process_history()
                .await?;
            Ok(pass_exit(summary.failed))
        }
        Command::Workflows => {
            let summary = workflow_loop(&config, &rt).await?.tick().await?;
            Ok(pass_exit(summary.failed))
        }
        Command::Daemon => run_daemon(&config, &rt).await,
    }
}
