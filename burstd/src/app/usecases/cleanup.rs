// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::sync::Arc;

use crate::app::errors::AppResult;
use crate::app::ports::{InfrastructurePort, LocalFilesystemPort, SleepPort};
use crate::app::services::classad::ClassAd;
use crate::app::services::job_ad;
use crate::app::services::retry::retry_delete;
use crate::app::types::{DeleteOutcome, InfraType, JobStatus};
use crate::app::usecases::{StatusMarker, write_status_marker};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupResult {
    /// Batch job; infrastructure is not ours to destroy.
    BatchJob,
    /// The job never got as far as deployment.
    NoInfrastructure,
    Deleted { infra_id: String, attempts: u32 },
    Failed { infra_id: String, attempts: u32, reason: String },
    TimedOut { infra_id: String, attempts: u32 },
}

impl CleanupResult {
    /// Hook exit status: 0 clean, 1 delete failed, 2 delete timed out.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::BatchJob | Self::NoInfrastructure | Self::Deleted { .. } => 0,
            Self::Failed { .. } => 1,
            Self::TimedOut { .. } => 2,
        }
    }
}

#[derive(Clone)]
pub struct CleanupHook {
    infra: Arc<dyn InfrastructurePort>,
    sleeper: Arc<dyn SleepPort>,
    fs: Arc<dyn LocalFilesystemPort>,
    max_attempts: u32,
}

impl CleanupHook {
    pub fn new(
        infra: Arc<dyn InfrastructurePort>,
        sleeper: Arc<dyn SleepPort>,
        fs: Arc<dyn LocalFilesystemPort>,
        max_attempts: u32,
    ) -> Self {
        Self {
            infra,
            sleeper,
            fs,
            max_attempts,
        }
    }

    /// Tear down the infrastructure a finished or removed job owns.
    ///
    /// Safe to repeat: deleting infrastructure that is already gone succeeds.
    pub async fn cleanup(&self, ad: &ClassAd) -> AppResult<CleanupResult> {
        let record = job_ad::decode(ad)?;
        let job_id = record.job_id;

        match record.infra_type() {
            InfraType::Batch => {
                tracing::info!(job_id, "batch job, nothing to clean up");
                return Ok(CleanupResult::BatchJob);
            }
            InfraType::Cloud => {}
        }

        let result = match record.infra_id() {
            None => {
                tracing::info!(job_id, "job has no infrastructure id, nothing to delete");
                CleanupResult::NoInfrastructure
            }
            Some(infra_id) => self.delete(job_id, infra_id).await,
        };

        let marker = if record.status == JobStatus::Completed {
            StatusMarker::Completed
        } else {
            StatusMarker::Failed
        };
        write_status_marker(self.fs.as_ref(), &record.working_directory, marker, job_id).await;

        Ok(result)
    }

    async fn delete(&self, job_id: i64, infra_id: &str) -> CleanupResult {
        let infra = self.infra.clone();
        let report = retry_delete(self.max_attempts, self.sleeper.as_ref(), |attempt| {
            let infra = infra.clone();
            let infra_id = infra_id.to_string();
            async move {
                tracing::debug!(job_id, infra_id = %infra_id, attempt, "deleting infrastructure");
                infra.delete(&infra_id).await
            }
        })
        .await;

        let infra_id = infra_id.to_string();
        let attempts = report.attempts;
        match report.outcome {
            DeleteOutcome::Deleted => {
                tracing::info!(job_id, infra_id = %infra_id, attempts, "infrastructure deleted");
                CleanupResult::Deleted { infra_id, attempts }
            }
            DeleteOutcome::TimedOut => {
                tracing::error!(
                    job_id,
                    infra_id = %infra_id,
                    attempts,
                    "infrastructure deletion timed out; resources may be leaking"
                );
                CleanupResult::TimedOut { infra_id, attempts }
            }
            DeleteOutcome::Failed(reason) => {
                tracing::error!(
                    job_id,
                    infra_id = %infra_id,
                    attempts,
                    "infrastructure deletion failed; resources may be leaking: {reason}"
                );
                CleanupResult::Failed {
                    infra_id,
                    attempts,
                    reason,
                }
            }
        }
    }
}
