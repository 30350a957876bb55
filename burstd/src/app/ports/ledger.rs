// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;

use crate::app::errors::AppResult;
use crate::app::types::LedgerState;

#[async_trait]
/// Persistent record of completed jobs whose side effects were dispatched.
///
/// `try_claim` is the only concurrency primitive: it atomically moves an unknown
/// (or stale claimed) job into `Claimed` and reports whether this caller won.
/// `Processed` is terminal and never reverts.
pub trait LedgerPort: Send + Sync {
    async fn state(&self, job_id: i64) -> AppResult<LedgerState>;
    async fn try_claim(&self, job_id: i64) -> AppResult<bool>;
    async fn mark_processed(&self, job_id: i64) -> AppResult<()>;
    async fn release_claim(&self, job_id: i64) -> AppResult<()>;
}
