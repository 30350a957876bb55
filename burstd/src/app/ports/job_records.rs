// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;

use crate::app::errors::AppResult;
use crate::app::services::classad::{AdValue, ClassAd};

#[async_trait]
/// Scheduler queue and history boundary.
/// Constraints use the scheduler's expression language; results are raw ads.
pub trait JobRecordStorePort: Send + Sync {
    async fn query_live(&self, constraint: &str, attributes: &[&str]) -> AppResult<Vec<ClassAd>>;

    async fn query_history(
        &self,
        constraint: &str,
        attributes: &[&str],
        limit: usize,
    ) -> AppResult<Vec<ClassAd>>;

    async fn mutate(&self, constraint: &str, attribute: &str, value: &AdValue) -> AppResult<()>;
}
