// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! In-memory port implementations shared by use-case tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::{
    AccountingPort, ClockPort, InfrastructurePort, JobRecordStorePort, LedgerPort,
    LocalFilesystemPort, MetricsPort, Notification, NotificationPort, SleepPort, UrlIssuerPort,
    WorkflowStorePort,
};
use crate::app::services::classad::{AdValue, ClassAd};
use crate::app::types::{
    DagProgress, DeleteOutcome, DeploymentRequest, LedgerState, NewWorkflow, UrlVerb,
    WorkflowRecord, WorkflowStatus,
};

pub const NOW: i64 = 1_700_000_000;

pub struct FixedClock(pub i64);

impl ClockPort for FixedClock {
    fn now_utc(&self) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(self.0).expect("valid epoch")
    }
}

#[derive(Default)]
pub struct RecordingSleeper {
    pub pauses: Mutex<Vec<Duration>>,
}

#[async_trait]
impl SleepPort for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.pauses.lock().expect("pauses lock").push(duration);
    }
}

#[derive(Default)]
pub struct MemoryFs {
    pub files: Mutex<HashMap<PathBuf, String>>,
    pub renames: Mutex<Vec<(PathBuf, PathBuf)>>,
    pub atomic_writes: Mutex<Vec<PathBuf>>,
    pub fail_writes: Mutex<HashSet<PathBuf>>,
    pub dirs: Mutex<HashSet<PathBuf>>,
}

impl MemoryFs {
    pub fn with_file(self, path: impl Into<PathBuf>, contents: &str) -> Self {
        self.files
            .lock()
            .expect("files lock")
            .insert(path.into(), contents.to_string());
        self
    }

    pub fn read(&self, path: impl AsRef<Path>) -> Option<String> {
        self.files
            .lock()
            .expect("files lock")
            .get(path.as_ref())
            .cloned()
    }

    pub fn fail_writes_to(&self, path: impl Into<PathBuf>) {
        self.fail_writes
            .lock()
            .expect("fail_writes lock")
            .insert(path.into());
    }

    pub fn rename_count(&self) -> usize {
        self.renames.lock().expect("renames lock").len()
    }

    fn check_writable(&self, path: &Path) -> AppResult<()> {
        if self.fail_writes.lock().expect("fail_writes lock").contains(path) {
            return Err(AppError::local(format!("write refused: {}", path.display())));
        }
        Ok(())
    }
}

#[async_trait]
impl LocalFilesystemPort for MemoryFs {
    async fn read_to_string(&self, path: &Path) -> AppResult<String> {
        self.read(path).ok_or_else(|| {
            AppError::with_message(
                AppErrorKind::NotFound,
                codes::NOT_FOUND,
                format!("no such file: {}", path.display()),
            )
        })
    }

    async fn write_string(&self, path: &Path, contents: &str) -> AppResult<()> {
        self.check_writable(path)?;
        self.files
            .lock()
            .expect("files lock")
            .insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    async fn write_atomic(&self, path: &Path, contents: &str) -> AppResult<()> {
        self.check_writable(path)?;
        self.atomic_writes
            .lock()
            .expect("atomic_writes lock")
            .push(path.to_path_buf());
        let mut tmp = path.as_os_str().to_os_string();
        tmp.push("-tmp");
        self.renames
            .lock()
            .expect("renames lock")
            .push((PathBuf::from(tmp), path.to_path_buf()));
        self.files
            .lock()
            .expect("files lock")
            .insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> AppResult<()> {
        self.check_writable(to)?;
        let mut files = self.files.lock().expect("files lock");
        let contents = files
            .remove(from)
            .ok_or_else(|| AppError::local(format!("no such file: {}", from.display())))?;
        files.insert(to.to_path_buf(), contents);
        self.renames
            .lock()
            .expect("renames lock")
            .push((from.to_path_buf(), to.to_path_buf()));
        Ok(())
    }

    async fn create_dir_all(&self, dir: &Path) -> AppResult<()> {
        self.dirs
            .lock()
            .expect("dirs lock")
            .insert(dir.to_path_buf());
        Ok(())
    }

    async fn list_dir(&self, dir: &Path) -> AppResult<Vec<PathBuf>> {
        let mut entries: Vec<PathBuf> = self
            .files
            .lock()
            .expect("files lock")
            .keys()
            .filter(|path| path.parent() == Some(dir))
            .cloned()
            .collect();
        entries.sort();
        Ok(entries)
    }
}

/// Issues URLs that encode the verb and a SigV2-style expiry.
pub struct FakeIssuer {
    pub now: i64,
    pub calls: Mutex<Vec<(UrlVerb, String, String, Duration)>>,
    pub fail: bool,
}

impl FakeIssuer {
    pub fn new(now: i64) -> Self {
        Self {
            now,
            calls: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing(now: i64) -> Self {
        Self {
            fail: true,
            ..Self::new(now)
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("calls lock").len()
    }
}

#[async_trait]
impl UrlIssuerPort for FakeIssuer {
    async fn issue(
        &self,
        verb: UrlVerb,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> AppResult<String> {
        self.calls.lock().expect("calls lock").push((
            verb,
            bucket.to_string(),
            key.to_string(),
            ttl,
        ));
        if self.fail {
            return Err(AppError::with_message(
                AppErrorKind::Unavailable,
                codes::ISSUER_FAILURE,
                "issuer offline",
            ));
        }
        Ok(format!(
            "https://s3.example.org/{bucket}/{key}?Expires={}&Verb={}",
            self.now + ttl.as_secs() as i64,
            verb.as_method()
        ))
    }
}

pub struct FakeInfra {
    pub deploy_result: Mutex<AppResult<Option<String>>>,
    pub deploy_calls: Mutex<Vec<(DeploymentRequest, String)>>,
    pub delete_script: Mutex<VecDeque<DeleteOutcome>>,
    pub delete_calls: Mutex<Vec<String>>,
    /// Ids already removed; deleting them again reports success.
    pub deleted: Mutex<HashSet<String>>,
}

impl FakeInfra {
    pub fn deploying(id: Option<&str>) -> Self {
        Self::with_deploy(Ok(id.map(str::to_string)))
    }

    pub fn with_deploy(result: AppResult<Option<String>>) -> Self {
        Self {
            deploy_result: Mutex::new(result),
            deploy_calls: Mutex::new(Vec::new()),
            delete_script: Mutex::new(VecDeque::new()),
            delete_calls: Mutex::new(Vec::new()),
            deleted: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_deletes(self, outcomes: Vec<DeleteOutcome>) -> Self {
        *self.delete_script.lock().expect("delete_script lock") = outcomes.into();
        self
    }

    pub fn deploy_count(&self) -> usize {
        self.deploy_calls.lock().expect("deploy_calls lock").len()
    }

    pub fn delete_count(&self) -> usize {
        self.delete_calls.lock().expect("delete_calls lock").len()
    }
}

#[async_trait]
impl InfrastructurePort for FakeInfra {
    async fn deploy(
        &self,
        request: &DeploymentRequest,
        idempotency_key: &str,
    ) -> AppResult<Option<String>> {
        self.deploy_calls
            .lock()
            .expect("deploy_calls lock")
            .push((request.clone(), idempotency_key.to_string()));
        self.deploy_result.lock().expect("deploy_result lock").clone()
    }

    async fn delete(&self, infra_id: &str) -> DeleteOutcome {
        self.delete_calls
            .lock()
            .expect("delete_calls lock")
            .push(infra_id.to_string());
        let scripted = self
            .delete_script
            .lock()
            .expect("delete_script lock")
            .pop_front();
        let outcome = scripted.unwrap_or(DeleteOutcome::Deleted);
        if outcome == DeleteOutcome::Deleted {
            self.deleted
                .lock()
                .expect("deleted lock")
                .insert(infra_id.to_string());
        }
        outcome
    }
}

#[derive(Default)]
pub struct MemoryLedger {
    pub entries: Mutex<HashMap<i64, LedgerState>>,
}

impl MemoryLedger {
    pub fn get(&self, job_id: i64) -> LedgerState {
        self.entries
            .lock()
            .expect("entries lock")
            .get(&job_id)
            .copied()
            .unwrap_or(LedgerState::Unknown)
    }
}

#[async_trait]
impl LedgerPort for MemoryLedger {
    async fn state(&self, job_id: i64) -> AppResult<LedgerState> {
        Ok(self.get(job_id))
    }

    async fn try_claim(&self, job_id: i64) -> AppResult<bool> {
        let mut entries = self.entries.lock().expect("entries lock");
        match entries.get(&job_id) {
            Some(_) => Ok(false),
            None => {
                entries.insert(job_id, LedgerState::Claimed);
                Ok(true)
            }
        }
    }

    async fn mark_processed(&self, job_id: i64) -> AppResult<()> {
        self.entries
            .lock()
            .expect("entries lock")
            .insert(job_id, LedgerState::Processed);
        Ok(())
    }

    async fn release_claim(&self, job_id: i64) -> AppResult<()> {
        let mut entries = self.entries.lock().expect("entries lock");
        if entries.get(&job_id) == Some(&LedgerState::Claimed) {
            entries.remove(&job_id);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingAccounting {
    pub records: Mutex<Vec<(i64, serde_json::Value)>>,
    pub fail: Mutex<bool>,
}

impl RecordingAccounting {
    pub fn count(&self) -> usize {
        self.records.lock().expect("records lock").len()
    }
}

#[async_trait]
impl AccountingPort for RecordingAccounting {
    async fn upsert(&self, job_id: i64, record: &serde_json::Value) -> AppResult<()> {
        if *self.fail.lock().expect("fail lock") {
            return Err(AppError::with_message(
                AppErrorKind::Unavailable,
                codes::SINK_FAILURE,
                "accounting store unavailable",
            ));
        }
        self.records
            .lock()
            .expect("records lock")
            .push((job_id, record.clone()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn count(&self) -> usize {
        self.sent.lock().expect("sent lock").len()
    }
}

#[async_trait]
impl NotificationPort for RecordingNotifier {
    async fn notify(&self, notification: &Notification) {
        self.sent
            .lock()
            .expect("sent lock")
            .push(notification.clone());
    }
}

#[derive(Default)]
pub struct RecordingMetrics {
    pub lines: Mutex<Vec<String>>,
}

impl RecordingMetrics {
    pub fn count(&self) -> usize {
        self.lines.lock().expect("lines lock").len()
    }
}

#[async_trait]
impl MetricsPort for RecordingMetrics {
    async fn emit(&self, line: &str) {
        self.lines.lock().expect("lines lock").push(line.to_string());
    }
}

#[derive(Default)]
pub struct FakeScheduler {
    pub live: Mutex<Vec<ClassAd>>,
    pub history: Mutex<Vec<ClassAd>>,
    pub live_queries: Mutex<Vec<String>>,
    pub history_queries: Mutex<Vec<(String, usize)>>,
    pub mutations: Mutex<Vec<(String, String, AdValue)>>,
    pub fail_queries: bool,
}

impl FakeScheduler {
    pub fn with_live(ads: Vec<ClassAd>) -> Self {
        Self {
            live: Mutex::new(ads),
            ..Self::default()
        }
    }

    pub fn with_history(ads: Vec<ClassAd>) -> Self {
        Self {
            history: Mutex::new(ads),
            ..Self::default()
        }
    }
}

#[async_trait]
impl JobRecordStorePort for FakeScheduler {
    async fn query_live(&self, constraint: &str, _attributes: &[&str]) -> AppResult<Vec<ClassAd>> {
        self.live_queries
            .lock()
            .expect("live_queries lock")
            .push(constraint.to_string());
        if self.fail_queries {
            return Err(AppError::with_message(
                AppErrorKind::Unavailable,
                codes::SCHEDULER_ERROR,
                "schedd unreachable",
            ));
        }
        Ok(self.live.lock().expect("live lock").clone())
    }

    async fn query_history(
        &self,
        constraint: &str,
        _attributes: &[&str],
        limit: usize,
    ) -> AppResult<Vec<ClassAd>> {
        self.history_queries
            .lock()
            .expect("history_queries lock")
            .push((constraint.to_string(), limit));
        Ok(self.history.lock().expect("history lock").clone())
    }

    async fn mutate(&self, constraint: &str, attribute: &str, value: &AdValue) -> AppResult<()> {
        self.mutations.lock().expect("mutations lock").push((
            constraint.to_string(),
            attribute.to_string(),
            value.clone(),
        ));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryWorkflows {
    pub records: Mutex<Vec<WorkflowRecord>>,
    pub lock_held: Mutex<bool>,
    pub fail_progress_for: Mutex<HashSet<i64>>,
}

impl MemoryWorkflows {
    pub fn get(&self, id: i64) -> Option<WorkflowRecord> {
        self.records
            .lock()
            .expect("records lock")
            .iter()
            .find(|w| w.id == id)
            .cloned()
    }

    fn update(&self, id: i64, apply: impl FnOnce(&mut WorkflowRecord)) -> AppResult<()> {
        let mut records = self.records.lock().expect("records lock");
        let record = records
            .iter_mut()
            .find(|w| w.id == id)
            .ok_or_else(|| AppError::with_message(AppErrorKind::NotFound, codes::NOT_FOUND, "no workflow"))?;
        apply(record);
        Ok(())
    }
}

#[async_trait]
impl WorkflowStorePort for MemoryWorkflows {
    async fn register_workflow(&self, workflow: &NewWorkflow) -> AppResult<bool> {
        let mut records = self.records.lock().expect("records lock");
        if records.iter().any(|w| w.id == workflow.id) {
            return Ok(false);
        }
        records.push(WorkflowRecord {
            id: workflow.id,
            status: WorkflowStatus::Created,
            iwd: workflow.iwd.clone(),
            identity: workflow.identity.clone(),
            groups: workflow.groups.clone(),
            uid: workflow.uid.clone(),
            dag_status: None,
            nodes_total: None,
            nodes_done: None,
            nodes_failed: None,
            started_at: None,
        });
        Ok(true)
    }

    async fn list_workflows(&self, status: WorkflowStatus) -> AppResult<Vec<WorkflowRecord>> {
        Ok(self
            .records
            .lock()
            .expect("records lock")
            .iter()
            .filter(|w| w.status == status)
            .cloned()
            .collect())
    }

    async fn update_progress(&self, id: i64, progress: &DagProgress) -> AppResult<()> {
        if self
            .fail_progress_for
            .lock()
            .expect("fail_progress_for lock")
            .contains(&id)
        {
            return Err(AppError::with_message(
                AppErrorKind::Internal,
                codes::STORAGE_ERROR,
                "disk I/O error",
            ));
        }
        self.update(id, |w| {
            w.dag_status = Some(progress.dag_status);
            w.nodes_total = Some(progress.nodes_total);
            w.nodes_done = Some(progress.nodes_done);
            w.nodes_failed = Some(progress.nodes_failed);
        })
    }

    async fn set_started_at(&self, id: i64, started_at: i64) -> AppResult<()> {
        self.update(id, |w| w.started_at = Some(started_at))
    }

    async fn set_workflow_status(&self, id: i64, status: WorkflowStatus) -> AppResult<()> {
        self.update(id, |w| w.status = status)
    }

    async fn try_acquire_lock(&self, _name: &str, _ttl: Duration) -> AppResult<bool> {
        let mut held = self.lock_held.lock().expect("lock_held lock");
        if *held {
            return Ok(false);
        }
        *held = true;
        Ok(true)
    }

    async fn release_lock(&self, _name: &str) -> AppResult<()> {
        *self.lock_held.lock().expect("lock_held lock") = false;
        Ok(())
    }
}
