// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;

/// Time source boundary for UTC timestamps.
/// Makes time-dependent logic deterministic and testable.
pub trait ClockPort: Send + Sync {
    fn now_utc(&self) -> OffsetDateTime;

    fn now_epoch(&self) -> i64 {
        self.now_utc().unix_timestamp()
    }
}

/// Blocking pause between retry attempts; swapped for a recorder in tests.
#[async_trait]
pub trait SleepPort: Send + Sync {
    async fn sleep(&self, duration: Duration);
}
