// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::adapters::condor::CondorTools;
use crate::adapters::deployment::{DeploymentClientConfig, ImageSpec};
use crate::adapters::sinks::AccountingConfig;
use crate::adapters::storage::S3Credentials;
use crate::app::types::{DeploymentDefaults, Placement};
use crate::app::usecases::{CompletionSettings, RefreshPolicy, StorageTarget, WorkflowSettings};

const APP_DIR_NAME: &str = "burstd";
const CONFIG_FILE_NAME: &str = "burstd.toml";
const CONFIG_ENV_VAR: &str = "BURSTD_CONFIG_PATH";
const DATABASE_FILE_NAME: &str = "burstd.sqlite";
const PROCESSED_DIR_NAME: &str = "processed";
const DEFAULT_METRICS_SOCKET: &str = "/tmp/telegraf.sock";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeploymentSection {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_secs: u64,
    pub retries: u32,
}

impl Default for DeploymentSection {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: None,
            password: None,
            timeout_secs: 30,
            retries: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageSection {
    pub url: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            url: String::new(),
            bucket: String::new(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            region: "us-east-1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CredentialsSection {
    pub threshold_secs: u64,
    pub lifetime_secs: u64,
}

impl Default for CredentialsSection {
    fn default() -> Self {
        Self {
            threshold_secs: 5 * 86_400,
            lifetime_secs: 7 * 86_400,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompletionSection {
    pub queue_window_secs: u64,
    pub history_limit: usize,
    pub claim_ttl_secs: u64,
    pub queue_interval_secs: u64,
    pub history_interval_secs: u64,
}

impl Default for CompletionSection {
    fn default() -> Self {
        Self {
            queue_window_secs: 120,
            history_limit: 500,
            claim_ttl_secs: 900,
            queue_interval_secs: 30,
            history_interval_secs: 60,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileSpool {
    history_dir: Option<String>,
    processed_dir: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SpoolSection {
    pub history_dir: Option<PathBuf>,
    pub processed_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AccountingSection {
    pub url: String,
    pub index: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_secs: u64,
}

impl Default for AccountingSection {
    fn default() -> Self {
        Self {
            url: String::new(),
            index: "jobs".to_string(),
            username: None,
            password: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotificationsSection {
    pub webhook_url: Option<String>,
    pub sender: String,
    pub timeout_secs: u64,
}

impl Default for NotificationsSection {
    fn default() -> Self {
        Self {
            webhook_url: None,
            sender: "burstd@localhost".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileMetrics {
    enabled: bool,
    socket: Option<String>,
}

impl Default for FileMetrics {
    fn default() -> Self {
        Self {
            enabled: true,
            socket: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSection {
    pub socket: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerSection {
    pub q_bin: String,
    pub history_bin: String,
    pub qedit_bin: String,
    pub timeout_secs: u64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        let tools = CondorTools::default();
        Self {
            q_bin: tools.q_bin,
            history_bin: tools.history_bin,
            qedit_bin: tools.qedit_bin,
            timeout_secs: tools.timeout.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkflowsSection {
    pub dagman_path: String,
    pub lock_ttl_secs: u64,
    pub interval_secs: u64,
}

impl Default for WorkflowsSection {
    fn default() -> Self {
        let settings = WorkflowSettings::default();
        Self {
            dagman_path: settings.dagman_path,
            lock_ttl_secs: settings.lock_ttl.as_secs(),
            interval_secs: 60,
        }
    }
}

/// Site/region constraints used when a job description has none.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlacementSection {
    pub required_sites: Vec<String>,
    pub required_regions: Vec<String>,
    pub preferred_sites: Vec<String>,
    pub preferred_regions: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileLogs {
    dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    database_path: Option<String>,
    verbose: Option<bool>,
    deployment: DeploymentSection,
    storage: StorageSection,
    credentials: CredentialsSection,
    completion: CompletionSection,
    spool: FileSpool,
    accounting: AccountingSection,
    notifications: NotificationsSection,
    metrics: FileMetrics,
    scheduler: SchedulerSection,
    workflows: WorkflowsSection,
    placement: PlacementSection,
    image: Option<ImageSpec>,
    logs: FileLogs,
}

#[derive(Debug)]
pub struct Config {
    pub database_path: PathBuf,
    pub verbose: bool,
    #[allow(dead_code)]
    pub config_path: Option<PathBuf>,
    pub deployment: DeploymentSection,
    pub storage: StorageSection,
    pub credentials: CredentialsSection,
    pub completion: CompletionSection,
    pub spool: SpoolSection,
    pub accounting: AccountingSection,
    pub notifications: NotificationsSection,
    pub metrics: MetricsSection,
    pub scheduler: SchedulerSection,
    pub workflows: WorkflowsSection,
    pub placement: PlacementSection,
    pub image: ImageSpec,
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    Override,
    Env,
    ConfigFile,
    Default,
}

impl ConfigSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigSource::Override => "override",
            ConfigSource::Env => "env",
            ConfigSource::ConfigFile => "config",
            ConfigSource::Default => "default",
        }
    }
}

#[derive(Debug)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

#[derive(Debug)]
pub struct ConfigReport {
    pub config_path: Option<PathBuf>,
    pub config_path_source: Option<ConfigSource>,
    pub config_file_present: bool,
    pub database_path: ConfigValue<PathBuf>,
    pub verbose: ConfigValue<bool>,
    pub history_dir: ConfigValue<Option<PathBuf>>,
}

#[derive(Debug)]
pub struct LoadResult {
    pub config: Config,
    pub report: ConfigReport,
}

#[derive(Debug, Default)]
pub struct Overrides {
    pub database_path: Option<PathBuf>,
    pub verbose: Option<bool>,
}

#[allow(dead_code)]
pub fn load(config_path_override: Option<PathBuf>, overrides: Overrides) -> Result<Config> {
    Ok(load_with_report(config_path_override, overrides)?.config)
}

pub fn load_with_report(
    config_path_override: Option<PathBuf>,
    overrides: Overrides,
) -> Result<LoadResult> {
    let (config_path, config_path_source, required) = match config_path_override {
        Some(path) => (Some(expand_path(path)), Some(ConfigSource::Override), true),
        None => match config_path_from_env()? {
            Some(path) => (Some(expand_path(path)), Some(ConfigSource::Env), true),
            None => match default_config_path().ok() {
                Some(path) => (Some(path), Some(ConfigSource::Default), false),
                None => (None, None, false),
            },
        },
    };
    let config_file_present = config_path
        .as_deref()
        .map(|path| path.exists())
        .unwrap_or(false);

    let file_config = match config_path.as_deref() {
        Some(path) => read_config_file(path, required)?,
        None => FileConfig::default(),
    };
    let base_dir = config_path.as_deref().and_then(|path| path.parent());

    let (database_path, database_source) = match overrides.database_path {
        Some(path) => (expand_path(path), ConfigSource::Override),
        None => match file_config.database_path {
            Some(raw) => (resolve_path(&raw, base_dir), ConfigSource::ConfigFile),
            None => (
                default_database_path().with_context(|| {
                    "failed to resolve default database path; specify --database-path or set database_path in the config file"
                })?,
                ConfigSource::Default,
            ),
        },
    };

    let (verbose, verbose_source) = match overrides.verbose {
        Some(verbose) => (verbose, ConfigSource::Override),
        None => match file_config.verbose {
            Some(verbose) => (verbose, ConfigSource::ConfigFile),
            None => (false, ConfigSource::Default),
        },
    };

    if file_config.deployment.retries == 0 {
        anyhow::bail!("deployment.retries must be at least 1");
    }
    if file_config.completion.claim_ttl_secs == 0 {
        anyhow::bail!("completion.claim_ttl_secs must be greater than 0");
    }
    for (name, secs) in [
        ("completion.queue_interval_secs", file_config.completion.queue_interval_secs),
        ("completion.history_interval_secs", file_config.completion.history_interval_secs),
        ("workflows.interval_secs", file_config.workflows.interval_secs),
    ] {
        if secs == 0 {
            anyhow::bail!("{name} must be greater than 0");
        }
    }

    let history_dir = file_config
        .spool
        .history_dir
        .as_deref()
        .map(|raw| resolve_path(raw, base_dir));
    let history_source = if history_dir.is_some() {
        ConfigSource::ConfigFile
    } else {
        ConfigSource::Default
    };
    let processed_dir = match (&file_config.spool.processed_dir, &history_dir) {
        (Some(raw), _) => resolve_path(raw, base_dir),
        (None, Some(history)) => history.join(PROCESSED_DIR_NAME),
        (None, None) => default_data_dir()
            .map(|dir| dir.join(PROCESSED_DIR_NAME))
            .unwrap_or_else(|_| PathBuf::from(PROCESSED_DIR_NAME)),
    };

    let metrics_socket = file_config.metrics.enabled.then(|| {
        file_config
            .metrics
            .socket
            .as_deref()
            .map(|raw| resolve_path(raw, base_dir))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_METRICS_SOCKET))
    });

    let config = Config {
        database_path,
        verbose,
        config_path: config_path.clone(),
        deployment: file_config.deployment,
        storage: file_config.storage,
        credentials: file_config.credentials,
        completion: file_config.completion,
        spool: SpoolSection {
            history_dir,
            processed_dir,
        },
        accounting: file_config.accounting,
        notifications: file_config.notifications,
        metrics: MetricsSection {
            socket: metrics_socket,
        },
        scheduler: file_config.scheduler,
        workflows: file_config.workflows,
        placement: file_config.placement,
        image: file_config.image.unwrap_or_else(default_image),
        log_dir: file_config
            .logs
            .dir
            .as_deref()
            .map(|raw| resolve_path(raw, base_dir)),
    };

    let report = ConfigReport {
        config_path,
        config_path_source,
        config_file_present,
        database_path: ConfigValue {
            value: config.database_path.clone(),
            source: database_source,
        },
        verbose: ConfigValue {
            value: config.verbose,
            source: verbose_source,
        },
        history_dir: ConfigValue {
            value: config.spool.history_dir.clone(),
            source: history_source,
        },
    };

    Ok(LoadResult { config, report })
}

impl Config {
    pub fn deployment_configured(&self) -> bool {
        !self.deployment.url.trim().is_empty()
    }

    pub fn deployment_client(&self) -> Result<DeploymentClientConfig> {
        if self.deployment.url.trim().is_empty() {
            anyhow::bail!("deployment.url is not set in the config file");
        }
        Ok(DeploymentClientConfig {
            url: self.deployment.url.clone(),
            username: self.deployment.username.clone(),
            password: self.deployment.password.clone(),
            timeout: Duration::from_secs(self.deployment.timeout_secs),
            image: self.image.clone(),
        })
    }

    pub fn deployment_defaults(&self) -> DeploymentDefaults {
        DeploymentDefaults {
            placement: Placement {
                required_sites: self.placement.required_sites.clone(),
                required_regions: self.placement.required_regions.clone(),
                preferred_sites: self.placement.preferred_sites.clone(),
                preferred_regions: self.placement.preferred_regions.clone(),
            },
            ..DeploymentDefaults::default()
        }
    }

    /// `None` when no object storage is configured.
    pub fn storage_target(&self) -> Option<StorageTarget> {
        let url = self.storage.url.trim();
        if url.is_empty() {
            return None;
        }
        Some(StorageTarget {
            url: url.to_string(),
            bucket: self.storage.bucket.clone(),
        })
    }

    pub fn s3_credentials(&self) -> S3Credentials {
        S3Credentials {
            access_key_id: self.storage.access_key_id.clone(),
            secret_access_key: self.storage.secret_access_key.clone(),
            region: self.storage.region.clone(),
        }
    }

    pub fn refresh_policy(&self) -> RefreshPolicy {
        RefreshPolicy {
            storage: self.storage_target(),
            threshold: Duration::from_secs(self.credentials.threshold_secs),
            lifetime: Duration::from_secs(self.credentials.lifetime_secs),
        }
    }

    pub fn completion_settings(&self) -> CompletionSettings {
        CompletionSettings {
            queue_window: Duration::from_secs(self.completion.queue_window_secs),
            history_dir: self.spool.history_dir.clone(),
            processed_dir: self.spool.processed_dir.clone(),
            history_limit: self.completion.history_limit,
        }
    }

    pub fn accounting_client(&self) -> Result<AccountingConfig> {
        if self.accounting.url.trim().is_empty() {
            anyhow::bail!("accounting.url is not set in the config file");
        }
        Ok(AccountingConfig {
            url: self.accounting.url.clone(),
            index: self.accounting.index.clone(),
            username: self.accounting.username.clone(),
            password: self.accounting.password.clone(),
            timeout: Duration::from_secs(self.accounting.timeout_secs),
        })
    }

    pub fn condor_tools(&self) -> CondorTools {
        CondorTools {
            q_bin: self.scheduler.q_bin.clone(),
            history_bin: self.scheduler.history_bin.clone(),
            qedit_bin: self.scheduler.qedit_bin.clone(),
            timeout: Duration::from_secs(self.scheduler.timeout_secs),
        }
    }

    pub fn workflow_settings(&self) -> WorkflowSettings {
        WorkflowSettings {
            dagman_path: self.workflows.dagman_path.clone(),
            lock_ttl: Duration::from_secs(self.workflows.lock_ttl_secs),
        }
    }

    pub fn claim_ttl(&self) -> Duration {
        Duration::from_secs(self.completion.claim_ttl_secs)
    }

    /// Per-command log file under `[logs] dir`, if configured.
    pub fn log_file(&self, command: &str) -> Option<PathBuf> {
        self.log_dir
            .as_ref()
            .map(|dir| dir.join(format!("{APP_DIR_NAME}-{command}.log")))
    }
}

fn default_image() -> ImageSpec {
    ImageSpec {
        distribution: "centos".to_string(),
        version: "7".to_string(),
        kind: "linux".to_string(),
        architecture: "x86_64".to_string(),
    }
}

pub fn ensure_database_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create database directory {}", parent.display()))?;
    }
    Ok(())
}

fn read_config_file(path: &Path, required: bool) -> Result<FileConfig> {
    if !path.exists() {
        if required {
            anyhow::bail!("config file not found at {}", path.display());
        }
        return Ok(FileConfig::default());
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

fn resolve_path(raw: &str, base_dir: Option<&Path>) -> PathBuf {
    let expanded = shellexpand::tilde(raw);
    let path = PathBuf::from(expanded.as_ref());
    if path.is_absolute() {
        return path;
    }
    match base_dir {
        Some(dir) => dir.join(path),
        None => path,
    }
}

fn expand_path(path: PathBuf) -> PathBuf {
    let path_string = path.to_string_lossy().to_string();
    let expanded = shellexpand::tilde(&path_string);
    PathBuf::from(expanded.as_ref())
}

fn config_path_from_env() -> Result<Option<PathBuf>> {
    match std::env::var_os(CONFIG_ENV_VAR) {
        Some(value) => {
            if value.is_empty() {
                anyhow::bail!("{CONFIG_ENV_VAR} is set but empty");
            }
            Ok(Some(PathBuf::from(value)))
        }
        None => Ok(None),
    }
}

fn default_config_path() -> Result<PathBuf> {
    let base = dirs::config_dir().context("failed to resolve config directory")?;
    Ok(base.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

fn default_database_path() -> Result<PathBuf> {
    Ok(default_data_dir()?.join(DATABASE_FILE_NAME))
}

fn default_data_dir() -> Result<PathBuf> {
    let base = dirs::data_dir().context("failed to resolve data directory")?;
    Ok(base.join(APP_DIR_NAME))
}
