// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Scheduler-visible job state. Mirrors the scheduler's integer codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Idle,
    Running,
    Removed,
    Completed,
    Held,
}

impl JobStatus {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Idle),
            2 => Some(Self::Running),
            3 => Some(Self::Removed),
            4 => Some(Self::Completed),
            5 => Some(Self::Held),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Idle => 1,
            Self::Running => 2,
            Self::Removed => 3,
            Self::Completed => 4,
            Self::Held => 5,
        }
    }
}

/// Lifecycle of per-job infrastructure as recorded on the job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InfraState {
    None,
    DeploymentInit,
    Configured,
    Failed,
    /// A state written by the external reconciler that this controller does not act on.
    Other(String),
}

impl InfraState {
    pub fn as_str(&self) -> &str {
        match self {
            Self::None => "none",
            Self::DeploymentInit => "deployment-init",
            Self::Configured => "configured",
            Self::Failed => "failed",
            Self::Other(value) => value,
        }
    }
}

impl FromStr for InfraState {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "" | "none" => Self::None,
            "deployment-init" => Self::DeploymentInit,
            "configured" => Self::Configured,
            "failed" => Self::Failed,
            other => Self::Other(other.to_string()),
        })
    }
}

impl fmt::Display for InfraState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InfraType {
    #[default]
    Cloud,
    Batch,
}

impl InfraType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cloud => "cloud",
            Self::Batch => "batch",
        }
    }
}

impl FromStr for InfraType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cloud" => Ok(Self::Cloud),
            "batch" => Ok(Self::Batch),
            other => Err(format!("unknown infrastructure type: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfraInfo {
    pub id: Option<String>,
    pub state: InfraState,
    pub site: Option<String>,
    pub kind: InfraType,
}

/// One scheduler job instance, decoded once from the scheduler's representation.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub job_id: i64,
    pub sub_id: i64,
    pub unique_id: Option<String>,
    pub factory_id: i64,
    pub owner: Option<String>,
    pub groups: Vec<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub job_type: Option<String>,
    pub status: JobStatus,
    pub working_directory: PathBuf,
    pub arguments: Option<String>,
    pub infra: Option<InfraInfo>,
    pub routed_from: Option<i64>,
    pub routed_to: Option<i64>,
    pub routed_by: Option<String>,
    pub route_name: Option<String>,
    pub machine_site: Option<String>,
    pub submitted_at: Option<i64>,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub entered_status_at: Option<i64>,
    pub exit_code: Option<i64>,
}

impl JobRecord {
    /// Scheduler-style `cluster.proc` label used in log lines.
    pub fn label(&self) -> String {
        format!("{}.{}", self.job_id, self.sub_id)
    }

    pub fn kind(&self) -> JobKind {
        JobKind::of(self)
    }

    pub fn infra_id(&self) -> Option<&str> {
        self.infra
            .as_ref()
            .and_then(|infra| infra.id.as_deref())
            .filter(|id| !id.is_empty())
    }

    pub fn infra_type(&self) -> InfraType {
        self.infra.as_ref().map(|infra| infra.kind).unwrap_or_default()
    }

    /// Site the job ran on: the infrastructure site if known, otherwise the matched machine's.
    pub fn site(&self) -> Option<&str> {
        self.infra
            .as_ref()
            .and_then(|infra| infra.site.as_deref())
            .or(self.machine_site.as_deref())
    }

    pub fn groups_joined(&self) -> String {
        self.groups.join(",")
    }
}

/// What a job record is, decided once when it is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// Runs on pre-existing batch capacity; never owns infrastructure.
    Batch,
    /// Original job destined for dynamically provisioned infrastructure.
    Cloud,
    /// Copy produced by the router to bind a job to infrastructure.
    RoutedCopy,
}

impl JobKind {
    pub fn of(record: &JobRecord) -> Self {
        let routed = record.routed_by.is_some()
            || record.route_name.is_some()
            || record.routed_from.is_some();
        if routed {
            Self::RoutedCopy
        } else if record.infra_type() == InfraType::Batch {
            Self::Batch
        } else {
            Self::Cloud
        }
    }
}

/// Router route a job is being translated onto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Batch { site: String },
    Cloud { name: String },
}

impl Route {
    pub fn parse(name: &str) -> Self {
        let name = name.trim();
        if name.contains("batch") {
            Self::Batch {
                site: name.to_string(),
            }
        } else {
            Self::Cloud {
                name: name.to_string(),
            }
        }
    }
}

/// HTTP verb a pre-signed URL grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlVerb {
    Get,
    Put,
}

impl UrlVerb {
    pub fn as_method(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
        }
    }
}

/// Request sent to the deployment service for one job instance.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentRequest {
    pub identity: String,
    pub groups: Vec<String>,
    pub working_directory: PathBuf,
    pub correlation_id: String,
    pub job_label: String,
    pub resources: Resources,
    pub placement: Placement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Resources {
    pub cpus: u32,
    pub memory_gb: u32,
    pub disk_gb: u32,
    pub nodes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Placement {
    pub required_sites: Vec<String>,
    pub required_regions: Vec<String>,
    pub preferred_sites: Vec<String>,
    pub preferred_regions: Vec<String>,
}

/// Fallbacks used when a job description leaves resources or placement unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentDefaults {
    pub resources: Resources,
    pub placement: Placement,
}

impl Default for DeploymentDefaults {
    fn default() -> Self {
        Self {
            resources: Resources {
                cpus: 1,
                memory_gb: 1,
                disk_gb: 10,
                nodes: 1,
            },
            placement: Placement::default(),
        }
    }
}

/// Result of one infrastructure delete call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    Failed(String),
    TimedOut,
}

/// Where a terminal job record was discovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordSource {
    Queue,
    /// One history file in the spool; archived once handled.
    HistoryFile(PathBuf),
    /// The scheduler's history query.
    History,
}

impl RecordSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queue => "queue",
            Self::HistoryFile(_) => "history-file",
            Self::History => "history",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerState {
    Unknown,
    Claimed,
    Processed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStatus {
    Created,
    Finished,
}

impl WorkflowStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Finished => "finished",
        }
    }
}

impl FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "finished" => Ok(Self::Finished),
            other => Err(format!("unknown workflow status: {other}")),
        }
    }
}

/// Workflow container job discovered in the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWorkflow {
    pub id: i64,
    pub iwd: PathBuf,
    pub identity: String,
    pub groups: String,
    pub uid: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowRecord {
    pub id: i64,
    pub status: WorkflowStatus,
    pub iwd: PathBuf,
    pub identity: String,
    pub groups: String,
    pub uid: String,
    pub dag_status: Option<i64>,
    pub nodes_total: Option<i64>,
    pub nodes_done: Option<i64>,
    pub nodes_failed: Option<i64>,
    pub started_at: Option<i64>,
}

/// Progress snapshot read from a workflow's DAG status file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DagProgress {
    pub dag_status: i64,
    pub nodes_total: i64,
    pub nodes_done: i64,
    pub nodes_failed: i64,
}

impl DagProgress {
    /// DAG manager status code for a DAG that is still running.
    pub const RUNNING: i64 = 3;

    pub fn is_running(&self) -> bool {
        self.dag_status == Self::RUNNING
    }
}
