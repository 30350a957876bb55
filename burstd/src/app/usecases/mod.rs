// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::{Path, PathBuf};

use crate::app::ports::LocalFilesystemPort;

mod cleanup;
mod completion;
mod credentials;
mod translate;
mod workflows;

#[cfg(test)]
pub(crate) mod fakes;

pub use cleanup::CleanupHook;
pub use completion::{CompletionProcessor, CompletionSettings};
pub use credentials::{CredentialRefresher, RefreshPolicy, StorageTarget};
pub use translate::TranslationHook;
pub use workflows::{WorkflowLoop, WorkflowSettings};

const JOB_DESCRIPTION: &str = ".job.json";
const MAPPED_DESCRIPTION: &str = ".job.mapped.json";
const STATUS_MARKER: &str = "status";

pub(crate) fn job_description_path(iwd: &Path) -> PathBuf {
    iwd.join(JOB_DESCRIPTION)
}

pub(crate) fn mapped_description_path(iwd: &Path) -> PathBuf {
    iwd.join(MAPPED_DESCRIPTION)
}

pub(crate) fn execution_stats_path(iwd: &Path, factory_id: i64) -> PathBuf {
    iwd.join(format!("promlet.{factory_id}.json"))
}

/// Values written to the per-job status marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusMarker {
    Deploying,
    Completed,
    Failed,
}

impl StatusMarker {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deploying => "deploying",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Best effort: a failed write is logged and otherwise ignored.
pub(crate) async fn write_status_marker(
    fs: &dyn LocalFilesystemPort,
    iwd: &Path,
    marker: StatusMarker,
    job_id: i64,
) {
    let path = iwd.join(STATUS_MARKER);
    if let Err(err) = fs.write_string(&path, marker.as_str()).await {
        tracing::warn!(
            job_id,
            path = %path.display(),
            "unable to write status marker: {err}"
        );
    }
}
