// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::adapters::db::{LedgerStore, LedgerStoreError};
use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::{ClockPort, LedgerPort, WorkflowStorePort};
use crate::app::types::{DagProgress, LedgerState, NewWorkflow, WorkflowRecord, WorkflowStatus};

#[derive(Clone)]
pub struct SqliteStoreAdapter {
    store: Arc<LedgerStore>,
    clock: Arc<dyn ClockPort>,
    claim_ttl: Duration,
}

impl SqliteStoreAdapter {
    pub fn new(store: LedgerStore, clock: Arc<dyn ClockPort>, claim_ttl: Duration) -> Self {
        Self {
            store: Arc::new(store),
            clock,
            claim_ttl,
        }
    }
}

/// Persistence errors stop here; the core only sees `AppError`.
fn map_store_error(err: LedgerStoreError) -> AppError {
    match err {
        LedgerStoreError::WorkflowNotFound(id) => AppError::with_message(
            AppErrorKind::NotFound,
            codes::NOT_FOUND,
            format!("workflow {id} is not tracked"),
        ),
        LedgerStoreError::UnknownState(_) | LedgerStoreError::UnknownWorkflowStatus(_) => {
            AppError::with_message(AppErrorKind::Internal, codes::STORAGE_ERROR, err.to_string())
        }
        LedgerStoreError::Sqlx(inner) => AppError::with_message(
            AppErrorKind::Internal,
            codes::STORAGE_ERROR,
            inner.to_string(),
        ),
    }
}

#[async_trait]
impl LedgerPort for SqliteStoreAdapter {
    async fn state(&self, job_id: i64) -> AppResult<LedgerState> {
        self.store
            .ledger_state(job_id)
            .await
            .map_err(map_store_error)
    }

    async fn try_claim(&self, job_id: i64) -> AppResult<bool> {
        self.store
            .try_claim(job_id, self.clock.now_epoch(), self.claim_ttl)
            .await
            .map_err(map_store_error)
    }

    async fn mark_processed(&self, job_id: i64) -> AppResult<()> {
        self.store
            .mark_processed(job_id, self.clock.now_epoch())
            .await
            .map_err(map_store_error)
    }

    async fn release_claim(&self, job_id: i64) -> AppResult<()> {
        self.store
            .release_claim(job_id)
            .await
            .map_err(map_store_error)
    }
}

#[async_trait]
impl WorkflowStorePort for SqliteStoreAdapter {
    async fn register_workflow(&self, workflow: &NewWorkflow) -> AppResult<bool> {
        self.store
            .register_workflow(workflow)
            .await
            .map_err(map_store_error)
    }

    async fn list_workflows(&self, status: WorkflowStatus) -> AppResult<Vec<WorkflowRecord>> {
        self.store
            .list_workflows(status)
            .await
            .map_err(map_store_error)
    }

    async fn update_progress(&self, id: i64, progress: &DagProgress) -> AppResult<()> {
        self.store
            .update_progress(id, progress)
            .await
            .map_err(map_store_error)
    }

    async fn set_started_at(&self, id: i64, started_at: i64) -> AppResult<()> {
        self.store
            .set_started_at(id, started_at)
            .await
            .map_err(map_store_error)
    }

    async fn set_workflow_status(&self, id: i64, status: WorkflowStatus) -> AppResult<()> {
        self.store
            .set_workflow_status(id, status)
            .await
            .map_err(map_store_error)
    }

    async fn try_acquire_lock(&self, name: &str, ttl: Duration) -> AppResult<bool> {
        self.store
            .try_acquire_lock(name, self.clock.now_epoch(), ttl)
            .await
            .map_err(map_store_error)
    }

    async fn release_lock(&self, name: &str) -> AppResult<()> {
        self.store.release_lock(name).await.map_err(map_store_error)
    }
}
