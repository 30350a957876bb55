// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::sync::Arc;

use tracing::Instrument;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::{ClockPort, InfrastructurePort, LocalFilesystemPort};
use crate::app::services::classad::{AdValue, ClassAd};
use crate::app::services::deployment_request;
use crate::app::services::job_ad::{self, attr};
use crate::app::types::{DeploymentDefaults, InfraState, InfraType, JobRecord, JobStatus, Route};
use crate::app::usecases::credentials::CredentialRefresher;
use crate::app::usecases::{
    StatusMarker, job_description_path, mapped_description_path, write_status_marker,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslateDecision {
    /// Batch route: annotated with the site, no infrastructure.
    Batch { site: String },
    /// Cloud route for a job that is not idle; the ad is returned unchanged.
    PassThrough,
    Deployed { infra_id: String },
    /// Deployment did not produce infrastructure; the job carries `failed`.
    DeploymentFailed { reason: String },
}

#[derive(Debug, Clone)]
pub struct Translation {
    pub ad: ClassAd,
    pub decision: TranslateDecision,
}

#[derive(Clone)]
pub struct TranslationHook {
    infra: Arc<dyn InfrastructurePort>,
    refresher: CredentialRefresher,
    fs: Arc<dyn LocalFilesystemPort>,
    clock: Arc<dyn ClockPort>,
    defaults: DeploymentDefaults,
}

impl TranslationHook {
    pub fn new(
        infra: Arc<dyn InfrastructurePort>,
        refresher: CredentialRefresher,
        fs: Arc<dyn LocalFilesystemPort>,
        clock: Arc<dyn ClockPort>,
        defaults: DeploymentDefaults,
    ) -> Self {
        Self {
            infra,
            refresher,
            fs,
            clock,
            defaults,
        }
    }

    /// Decide the infrastructure fate of a job being routed onto `route`.
    ///
    /// Errors only when the job ad cannot be decoded or the credential refresh
    /// fails; both abort the routing attempt. Deployment problems are recorded
    /// on the ad instead.
    pub async fn translate(&self, route: &Route, mut ad: ClassAd) -> AppResult<Translation> {
        let name = match route {
            Route::Batch { site } => {
                ad.set(attr::INFRA_SITE, AdValue::string(site.clone()));
                ad.set(attr::INFRA_TYPE, AdValue::string(InfraType::Batch.as_str()));
                tracing::info!(route = %site, "batch route, no infrastructure needed");
                return Ok(Translation {
                    ad,
                    decision: TranslateDecision::Batch { site: site.clone() },
                });
            }
            Route::Cloud { name } => name,
        };

        let record = job_ad::decode(&ad)?;
        let job_id = record.job_id;
        if record.status != JobStatus::Idle {
            tracing::info!(
                job_id,
                route = %name,
                status = ?record.status,
                "job not idle, passing through"
            );
            return Ok(Translation {
                ad,
                decision: TranslateDecision::PassThrough,
            });
        }

        let correlation_id = deployment_request::correlation_id(&record);
        let span = tracing::info_span!(
            "translate",
            job_id,
            route = %name,
            correlation_id = %correlation_id
        );
        self.route_idle_job(name, &record, &correlation_id, ad)
            .instrument(span)
            .await
    }

    async fn route_idle_job(
        &self,
        name: &str,
        record: &JobRecord,
        correlation_id: &str,
        mut ad: ClassAd,
    ) -> AppResult<Translation> {
        let job_id = record.job_id;
        let args = record.arguments.clone().unwrap_or_default();
        let mapped = mapped_description_path(&record.working_directory);
        let refreshed = match self.refresher.refresh(&args, &mapped).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(job_id, route = %name, "credential refresh failed: {err}");
                return Err(err);
            }
        };
        if refreshed.args != args {
            ad.set(attr::ARGUMENTS, AdValue::string(refreshed.args));
        }
        if refreshed.replaced > 0 {
            tracing::info!(job_id, replaced = refreshed.replaced, "refreshed pre-signed urls");
        }

        let now = self.clock.now_epoch();
        ad.set(attr::LAST_ROUTED, AdValue::Integer(now));
        ad.set(attr::INFRA_ENTERED_STATUS, AdValue::Integer(now));

        let decision = match self.deploy(record, correlation_id).await {
            Ok(infra_id) => {
                tracing::info!(job_id, infra_id = %infra_id, "infrastructure deployment started");
                ad.set(attr::INFRA_ID, AdValue::string(infra_id.clone()));
                ad.set(
                    attr::INFRA_STATE,
                    AdValue::string(InfraState::DeploymentInit.as_str()),
                );
                ad.set(attr::INFRA_TYPE, AdValue::string(InfraType::Cloud.as_str()));
                ad.set(attr::WANT_CLUSTER, AdValue::string(correlation_id));
                ad.set(attr::BURST_PROC_ID, AdValue::Integer(record.sub_id));
                ad.set(
                    attr::REQUIREMENTS,
                    AdValue::expr(job_ad::CONFIGURED_REQUIREMENT),
                );
                TranslateDecision::Deployed { infra_id }
            }
            Err(err) => {
                tracing::error!(
                    job_id,
                    route = %name,
                    code = err.code(),
                    "infrastructure deployment failed: {err}"
                );
                ad.set(attr::INFRA_STATE, AdValue::string(InfraState::Failed.as_str()));
                TranslateDecision::DeploymentFailed {
                    reason: err.to_string(),
                }
            }
        };

        write_status_marker(
            self.fs.as_ref(),
            &record.working_directory,
            StatusMarker::Deploying,
            job_id,
        )
        .await;

        Ok(Translation { ad, decision })
    }

    async fn deploy(&self, record: &JobRecord, correlation_id: &str) -> AppResult<String> {
        let path = job_description_path(&record.working_directory);
        let raw = self
            .fs
            .read_to_string(&path)
            .await
            .map_err(|err| err.with_context(format!("reading {}", path.display())))?;
        let description: serde_json::Value = serde_json::from_str(&raw).map_err(|err| {
            AppError::invalid_record(format!("malformed job description: {err}"))
                .with_context(path.display().to_string())
        })?;
        let request =
            deployment_request::build(record, correlation_id, &description, &self.defaults)?;
        let idempotency_key = uuid::Uuid::new_v4().to_string();
        match self.infra.deploy(&request, &idempotency_key).await? {
            Some(id) if !id.trim().is_empty() => Ok(id),
            _ => Err(AppError::with_message(
                AppErrorKind::Unavailable,
                codes::DEPLOYMENT_FAILURE,
                "deployment service returned no infrastructure id",
            )),
        }
    }
}
