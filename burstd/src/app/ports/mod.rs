// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

pub mod clock;
pub mod infrastructure;
pub mod job_records;
pub mod ledger;
pub mod local_fs;
pub mod sinks;
pub mod url_issuer;
pub mod workflow_store;

pub use clock::{ClockPort, SleepPort};
pub use infrastructure::InfrastructurePort;
pub use job_records::JobRecordStorePort;
pub use ledger::LedgerPort;
pub use local_fs::LocalFilesystemPort;
pub use sinks::{AccountingPort, MetricsPort, Notification, NotificationPort};
pub use url_issuer::UrlIssuerPort;
pub use workflow_store::WorkflowStorePort;
