// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::time::Duration;

use async_trait::async_trait;

use crate::app::errors::AppResult;
use crate::app::types::UrlVerb;

#[async_trait]
pub trait UrlIssuerPort: Send + Sync {
    async fn issue(
        &self,
        verb: UrlVerb,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> AppResult<String>;
}
