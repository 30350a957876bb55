// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::app::errors::{AppErrorKind, AppResult};
use crate::app::ports::{JobRecordStorePort, LocalFilesystemPort, WorkflowStorePort};
use crate::app::services::classad::ClassAd;
use crate::app::services::dag_status::{self, DAGMAN_LOG, STATUS_FILE};
use crate::app::services::job_ad::attr;
use crate::app::types::{NewWorkflow, WorkflowRecord, WorkflowStatus};

const LOCK_NAME: &str = "workflows";

const DISCOVERY_ATTRIBUTES: &[&str] = &[
    attr::IDENTITY,
    attr::GROUP,
    attr::IWD,
    attr::CLUSTER_ID,
    attr::UNIQUE_ID,
];

#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    /// Executable of the DAG manager; running jobs with this `Cmd` are workflows.
    pub dagman_path: String,
    pub lock_ttl: Duration,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            dagman_path: "/usr/bin/condor_dagman".to_string(),
            lock_ttl: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub registered: usize,
    pub advanced: usize,
    pub finished: usize,
    pub failed: usize,
    /// Another process held the lock, so no workflow was advanced.
    pub lock_busy: bool,
}

#[derive(Clone)]
pub struct WorkflowLoop {
    scheduler: Arc<dyn JobRecordStorePort>,
    store: Arc<dyn WorkflowStorePort>,
    fs: Arc<dyn LocalFilesystemPort>,
    settings: WorkflowSettings,
}

impl WorkflowLoop {
    pub fn new(
        scheduler: Arc<dyn JobRecordStorePort>,
        store: Arc<dyn WorkflowStorePort>,
        fs: Arc<dyn LocalFilesystemPort>,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            scheduler,
            store,
            fs,
            settings,
        }
    }

    pub async fn tick(&self) -> AppResult<TickSummary> {
        let mut summary = TickSummary {
            registered: self.discover().await?,
            ..TickSummary::default()
        };

        if !self
            .store
            .try_acquire_lock(LOCK_NAME, self.settings.lock_ttl)
            .await?
        {
            tracing::debug!("workflow lock held elsewhere, skipping advance");
            summary.lock_busy = true;
            return Ok(summary);
        }

        let advanced = self.advance_all(&mut summary).await;
        let released = self.store.release_lock(LOCK_NAME).await;
        advanced?;
        released?;

        tracing::info!(
            registered = summary.registered,
            advanced = summary.advanced,
            finished = summary.finished,
            failed = summary.failed,
            "workflow tick finished"
        );
        Ok(summary)
    }

    async fn discover(&self) -> AppResult<usize> {
        let constraint = format!(
            "Cmd =?= \"{}\" && JobStatus == 2",
            self.settings.dagman_path
        );
        let ads = self
            .scheduler
            .query_live(&constraint, DISCOVERY_ATTRIBUTES)
            .await?;

        let mut registered = 0;
        for ad in &ads {
            let Some(workflow) = new_workflow(ad) else {
                tracing::warn!("workflow ad without ClusterId or Iwd, ignoring");
                continue;
            };
            if self.store.register_workflow(&workflow).await? {
                tracing::info!(workflow_id = workflow.id, "tracking new workflow");
                registered += 1;
            }
        }
        Ok(registered)
    }

    async fn advance_all(&self, summary: &mut TickSummary) -> AppResult<()> {
        for workflow in self.store.list_workflows(WorkflowStatus::Created).await? {
            match self.advance(&workflow).await {
                Ok(Some(finished)) => {
                    summary.advanced += 1;
                    if finished {
                        summary.finished += 1;
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    summary.failed += 1;
                    tracing::error!(workflow_id = workflow.id, "unable to update workflow: {err}");
                }
            }
        }
        Ok(())
    }

    /// `None` when no progress is available yet; otherwise whether the workflow finished.
    async fn advance(&self, workflow: &WorkflowRecord) -> AppResult<Option<bool>> {
        let status_path = workflow.iwd.join(STATUS_FILE);
        let text = match self.fs.read_to_string(&status_path).await {
            Ok(text) => text,
            Err(err) if err.kind() == AppErrorKind::NotFound => {
                tracing::debug!(workflow_id = workflow.id, "no DAG status file yet");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        let Some(progress) = dag_status::parse_progress(&text)? else {
            return Ok(None);
        };

        self.store.update_progress(workflow.id, &progress).await?;

        if workflow.started_at.is_none() {
            let log_path = workflow.iwd.join(DAGMAN_LOG);
            let started = match self.fs.read_to_string(&log_path).await {
                Ok(log) => dag_status::parse_start_time(&log),
                Err(_) => None,
            };
            if let Some(started) = started {
                self.store.set_started_at(workflow.id, started).await?;
            }
        }

        if progress.is_running() {
            return Ok(Some(false));
        }
        self.store
            .set_workflow_status(workflow.id, WorkflowStatus::Finished)
            .await?;
        tracing::info!(
            workflow_id = workflow.id,
            dag_status = progress.dag_status,
            nodes_done = progress.nodes_done,
            nodes_failed = progress.nodes_failed,
            "workflow finished"
        );
        Ok(Some(true))
    }
}

fn new_workflow(ad: &ClassAd) -> Option<NewWorkflow> {
    let text = |name: &str| ad.get_str(name).unwrap_or_default().to_string();
    Some(NewWorkflow {
        id: ad.get_i64(attr::CLUSTER_ID)?,
        iwd: PathBuf::from(ad.get_str(attr::IWD).filter(|iwd| !iwd.is_empty())?),
        identity: text(attr::IDENTITY),
        groups: text(attr::GROUP),
        uid: text(attr::UNIQUE_ID),
    })
}
