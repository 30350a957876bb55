// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! HTTP client for the infrastructure deployment service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::InfrastructurePort;
use crate::app::types::{DeleteOutcome, DeploymentRequest};

/// Base image requested for every deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSpec {
    pub distribution: String,
    pub version: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub architecture: String,
}

#[derive(Debug, Clone)]
pub struct DeploymentClientConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
    pub image: ImageSpec,
}

#[derive(Clone)]
pub struct DeploymentClient {
    http: reqwest::Client,
    config: DeploymentClientConfig,
}

#[derive(Deserialize)]
struct Created {
    id: Option<String>,
}

impl DeploymentClient {
    pub fn new(config: DeploymentClientConfig) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| {
                AppError::with_message(
                    AppErrorKind::Internal,
                    codes::INTERNAL_ERROR,
                    format!("failed to build deployment HTTP client: {err}"),
                )
            })?;
        Ok(Self { http, config })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.username {
            Some(user) => request.basic_auth(user, self.config.password.as_deref()),
            None => request,
        }
    }

    fn delete_url(&self, infra_id: &str) -> String {
        format!("{}/{}", self.config.url.trim_end_matches('/'), infra_id)
    }
}

/// JSON document sent to the deployment service.
fn deployment_body(request: &DeploymentRequest, image: &ImageSpec) -> Value {
    let resources = request.resources;
    let mut requirements = json!({
        "image": image,
        "resources": {
            "cores": resources.cpus,
            "memory": resources.memory_gb,
            "disk": resources.disk_gb,
            "nodes": resources.nodes,
        },
        "regions": request.placement.required_regions,
        "sites": request.placement.required_sites,
        "groups": request.groups,
    });
    if resources.nodes > 1 {
        requirements["tags"] = json!({ "multi-node-jobs": "true" });
    }
    json!({
        "requirements": requirements,
        "preferences": {
            "regions": request.placement.preferred_regions,
            "sites": request.placement.preferred_sites,
        },
        "identifier": request.job_label,
        "identity": request.identity,
        "want": request.correlation_id,
        "workingDirectory": request.working_directory.to_string_lossy(),
    })
}

fn transport_error(err: reqwest::Error) -> AppError {
    if err.is_timeout() {
        AppError::with_message(
            AppErrorKind::Timeout,
            codes::DEPLOYMENT_TIMEOUT,
            format!("deployment request timed out: {err}"),
        )
    } else {
        AppError::with_message(
            AppErrorKind::Unavailable,
            codes::DEPLOYMENT_FAILURE,
            format!("deployment request failed: {err}"),
        )
    }
}

#[async_trait]
impl InfrastructurePort for DeploymentClient {
    async fn deploy(
        &self,
        request: &DeploymentRequest,
        idempotency_key: &str,
    ) -> AppResult<Option<String>> {
        let body = deployment_body(request, &self.config.image);
        tracing::debug!(
            correlation_id = %request.correlation_id,
            idempotency_key,
            "requesting infrastructure"
        );
        let response = self
            .authorize(self.http.post(&self.config.url))
            .header("Idempotency-Key", idempotency_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::CREATED {
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::with_message(
                AppErrorKind::Unavailable,
                codes::DEPLOYMENT_FAILURE,
                format!("deployment service returned {status}: {}", text.trim()),
            ));
        }
        let created: Created = response.json().await.map_err(|err| {
            AppError::with_message(
                AppErrorKind::InvalidData,
                codes::DEPLOYMENT_FAILURE,
                format!("unreadable deployment response: {err}"),
            )
        })?;
        Ok(created.id.filter(|id| !id.is_empty()))
    }

    async fn delete(&self, infra_id: &str) -> DeleteOutcome {
        let response = match self
            .authorize(self.http.delete(self.delete_url(infra_id)))
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) if err.is_timeout() => return DeleteOutcome::TimedOut,
            Err(err) => return DeleteOutcome::Failed(err.to_string()),
        };
        match response.status() {
            StatusCode::OK | StatusCode::NOT_FOUND => DeleteOutcome::Deleted,
            other => DeleteOutcome::Failed(format!("deployment service returned {other}")),
        }
    }
}

/// Stands in when `deployment.url` is empty. Batch routes and jobs without
/// infrastructure never reach it; anything that does is refused.
#[derive(Clone, Default)]
pub struct DeploymentDisabled;

const NOT_CONFIGURED: &str = "deployment service is not configured (deployment.url is empty)";

#[async_trait]
impl InfrastructurePort for DeploymentDisabled {
    async fn deploy(
        &self,
        request: &DeploymentRequest,
        _idempotency_key: &str,
    ) -> AppResult<Option<String>> {
        Err(AppError::with_message(
            AppErrorKind::Unavailable,
            codes::DEPLOYMENT_FAILURE,
            NOT_CONFIGURED,
        )
        .with_context(request.correlation_id.clone()))
    }

    async fn delete(&self, infra_id: &str) -> DeleteOutcome {
        DeleteOutcome::Failed(format!("{NOT_CONFIGURED}, cannot delete {infra_id}"))
    }
}
