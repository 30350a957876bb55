// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;

use crate::app::errors::AppResult;

#[async_trait]
/// Accounting store. Upserts by job id, so re-sending the same id is safe.
pub trait AccountingPort: Send + Sync {
    async fn upsert(&self, job_id: i64, record: &serde_json::Value) -> AppResult<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
/// Fire-and-forget notification channel. Implementations log and swallow failures.
pub trait NotificationPort: Send + Sync {
    async fn notify(&self, notification: &Notification);
}

#[async_trait]
/// Line-oriented metrics sink. Implementations log and swallow failures.
pub trait MetricsPort: Send + Sync {
    async fn emit(&self, line: &str);
}
