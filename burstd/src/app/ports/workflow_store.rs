// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::time::Duration;

use async_trait::async_trait;

use crate::app::errors::AppResult;
use crate::app::types::{DagProgress, NewWorkflow, WorkflowRecord, WorkflowStatus};

#[async_trait]
pub trait WorkflowStorePort: Send + Sync {
    /// Returns false when the workflow was already tracked.
    async fn register_workflow(&self, workflow: &NewWorkflow) -> AppResult<bool>;
    async fn list_workflows(&self, status: WorkflowStatus) -> AppResult<Vec<WorkflowRecord>>;
    async fn update_progress(&self, id: i64, progress: &DagProgress) -> AppResult<()>;
    async fn set_started_at(&self, id: i64, started_at: i64) -> AppResult<()>;
    async fn set_workflow_status(&self, id: i64, status: WorkflowStatus) -> AppResult<()>;
    /// Cross-process lock; a holder older than `ttl` is taken over.
    async fn try_acquire_lock(&self, name: &str, ttl: Duration) -> AppResult<bool>;
    async fn release_lock(&self, name: &str) -> AppResult<()>;
}
