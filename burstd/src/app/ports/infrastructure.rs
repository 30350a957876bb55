// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;

use crate::app::errors::AppResult;
use crate::app::types::{DeleteOutcome, DeploymentRequest};

#[async_trait]
/// Infrastructure deployment service boundary.
pub trait InfrastructurePort: Send + Sync {
    /// Returns the new infrastructure id, or `None` when the service accepted the
    /// request without handing one back.
    async fn deploy(
        &self,
        request: &DeploymentRequest,
        idempotency_key: &str,
    ) -> AppResult<Option<String>>;

    /// Deleting something that no longer exists reports `Deleted`.
    async fn delete(&self, infra_id: &str) -> DeleteOutcome;
}
