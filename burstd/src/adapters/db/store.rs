// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use sqlx::{
    Row, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
};
use std::{path::Path, path::PathBuf, str::FromStr, time::Duration};
use thiserror::Error;

use crate::app::types::{DagProgress, LedgerState, NewWorkflow, WorkflowRecord, WorkflowStatus};

#[derive(Debug, Error)]
pub enum LedgerStoreError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("unknown ledger state: {0}")]
    UnknownState(String),
    #[error("unknown workflow status: {0}")]
    UnknownWorkflowStatus(String),
    #[error("workflow not found: {0}")]
    WorkflowNotFound(i64),
}

pub type Result<T> = std::result::Result<T, LedgerStoreError>;

/// Async store for the completion ledger, tracked workflows and named locks.
///
/// Every method that depends on wall-clock time takes `now` (epoch seconds)
/// from the caller.
#[derive(Clone)]
pub struct LedgerStore {
    pool: SqlitePool,
}

impl LedgerStore {
    /// Open (or create) a file-backed SQLite DB.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let url = format!("sqlite://{}", path_ref.to_string_lossy());
        let opts = SqliteConnectOptions::from_str(&url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await?;
        let store = Self { pool };
        store.bootstrap().await?;
        Ok(store)
    }

    #[cfg(test)]
    pub async fn open_memory() -> Result<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        let store = Self { pool };
        store.bootstrap().await?;
        Ok(store)
    }

    async fn bootstrap(&self) -> Result<()> {
        // Hooks, cron passes and the daemon may share one file.
        let _ = sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await;

        self.ensure_completed_jobs_table().await?;
        self.ensure_workflows_table().await?;
        self.ensure_locks_table().await?;
        Ok(())
    }

    async fn ensure_completed_jobs_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS completed_jobs (
              job_id INTEGER PRIMARY KEY,
              state TEXT NOT NULL CHECK (state IN ('claimed', 'processed')),
              claimed_at INTEGER NOT NULL,
              processed_at INTEGER
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn ensure_workflows_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflows (
              id INTEGER PRIMARY KEY,
              status TEXT NOT NULL,
              iwd TEXT NOT NULL,
              identity TEXT NOT NULL,
              groups TEXT NOT NULL,
              uid TEXT NOT NULL,
              dag_status INTEGER,
              nodes_total INTEGER,
              nodes_done INTEGER,
              nodes_failed INTEGER,
              started_at INTEGER,
              created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
              updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
            );
            CREATE INDEX IF NOT EXISTS idx_workflows_status ON workflows(status);
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn ensure_locks_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS locks (
              name TEXT PRIMARY KEY,
              acquired_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn ledger_state(&self, job_id: i64) -> Result<LedgerState> {
        let row = sqlx::query("select state from completed_jobs where job_id = ?1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(LedgerState::Unknown);
        };
        let state: String = row.try_get("state")?;
        match state.as_str() {
            "claimed" => Ok(LedgerState::Claimed),
            "processed" => Ok(LedgerState::Processed),
            _ => Err(LedgerStoreError::UnknownState(state)),
        }
    }

    /// Insert a claim, or take over one older than `stale_after`.
    /// Returns whether this caller now holds the claim.
    pub async fn try_claim(&self, job_id: i64, now: i64, stale_after: Duration) -> Result<bool> {
        let stale_before = now - stale_after.as_secs() as i64;
        let result = sqlx::query(
            r#"
            insert into completed_jobs(job_id, state, claimed_at)
            values (?1, 'claimed', ?2)
            on conflict(job_id) do update set claimed_at = excluded.claimed_at
            where completed_jobs.state = 'claimed' and completed_jobs.claimed_at < ?3
            "#,
        )
        .bind(job_id)
        .bind(now)
        .bind(stale_before)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_processed(&self, job_id: i64, now: i64) -> Result<()> {
        sqlx::query(
            r#"
            insert into completed_jobs(job_id, state, claimed_at, processed_at)
            values (?1, 'processed', ?2, ?2)
            on conflict(job_id) do update set state = 'processed', processed_at = ?2
            "#,
        )
        .bind(job_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Drops a claim; a processed entry is never touched.
    pub async fn release_claim(&self, job_id: i64) -> Result<()> {
        sqlx::query("delete from completed_jobs where job_id = ?1 and state = 'claimed'")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn register_workflow(&self, workflow: &NewWorkflow) -> Result<bool> {
        let result = sqlx::query(
            r#"
            insert into workflows(id, status, iwd, identity, groups, uid)
            values (?1, ?2, ?3, ?4, ?5, ?6)
            on conflict(id) do nothing
            "#,
        )
        .bind(workflow.id)
        .bind(WorkflowStatus::Created.as_str())
        .bind(workflow.iwd.to_string_lossy().into_owned())
        .bind(&workflow.identity)
        .bind(&workflow.groups)
        .bind(&workflow.uid)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    #[cfg(test)]
    pub async fn get_workflow(&self, id: i64) -> Result<Option<WorkflowRecord>> {
        let row = sqlx::query("select * from workflows where id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_workflow).transpose()
    }

    pub async fn list_workflows(&self, status: WorkflowStatus) -> Result<Vec<WorkflowRecord>> {
        let rows = sqlx::query("select * from workflows where status = ?1 order by id")
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_workflow).collect()
    }

    pub async fn update_progress(&self, id: i64, progress: &DagProgress) -> Result<()> {
        let result = sqlx::query(
            r#"
            update workflows
            set dag_status = ?1,
                nodes_total = ?2,
                nodes_done = ?3,
                nodes_failed = ?4,
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ','now')
            where id = ?5
            "#,
        )
        .bind(progress.dag_status)
        .bind(progress.nodes_total)
        .bind(progress.nodes_done)
        .bind(progress.nodes_failed)
        .bind(id)
        .execute(&self.pool)
        .await?;
        ensure_updated(result.rows_affected(), id)
    }

    pub async fn set_started_at(&self, id: i64, started_at: i64) -> Result<()> {
        let result = sqlx::query(
            r#"
            update workflows
            set started_at = ?1, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ','now')
            where id = ?2
            "#,
        )
        .bind(started_at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        ensure_updated(result.rows_affected(), id)
    }

    pub async fn set_workflow_status(&self, id: i64, status: WorkflowStatus) -> Result<()> {
        let result = sqlx::query(
            r#"
            update workflows
            set status = ?1, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ','now')
            where id = ?2
            "#,
        )
        .bind(status.as_str())
        .bind(id)
        .execute(&self.pool)
        .await?;
        ensure_updated(result.rows_affected(), id)
    }

    /// Take the named lock if it is free or its holder is older than `ttl`.
    pub async fn try_acquire_lock(&self, name: &str, now: i64, ttl: Duration) -> Result<bool> {
        let stale_before = now - ttl.as_secs() as i64;
        let result = sqlx::query(
            r#"
            insert into locks(name, acquired_at)
            values (?1, ?2)
            on conflict(name) do update set acquired_at = excluded.acquired_at
            where locks.acquired_at < ?3
            "#,
        )
        .bind(name)
        .bind(now)
        .bind(stale_before)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn release_lock(&self, name: &str) -> Result<()> {
        sqlx::query("delete from locks where name = ?1")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn ensure_updated(rows: u64, id: i64) -> Result<()> {
    if rows == 0 {
        return Err(LedgerStoreError::WorkflowNotFound(id));
    }
    Ok(())
}

fn row_to_workflow(row: SqliteRow) -> Result<WorkflowRecord> {
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<WorkflowStatus>()
        .map_err(|_| LedgerStoreError::UnknownWorkflowStatus(status.clone()))?;
    Ok(WorkflowRecord {
        id: row.try_get("id")?,
        status,
        iwd: PathBuf::from(row.try_get::<String, _>("iwd")?),
        identity: row.try_get("identity")?,
        groups: row.try_get("groups")?,
        uid: row.try_get("uid")?,
        dag_status: row.try_get("dag_status")?,
        nodes_total: row.try_get("nodes_total")?,
        nodes_done: row.try_get("nodes_done")?,
        nodes_failed: row.try_get("nodes_failed")?,
        started_at: row.try_get("started_at")?,
    })
}
