// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use serde::Deserialize;
use serde_json::Value;

use crate::app::errors::{AppError, AppResult};
use crate::app::types::{DeploymentDefaults, DeploymentRequest, JobRecord, Placement, Resources};

#[derive(Debug, Default, Deserialize)]
struct Description {
    #[serde(default)]
    resources: Option<ResourceSection>,
    #[serde(default)]
    policies: Option<Policies>,
}

#[derive(Debug, Default, Deserialize)]
struct ResourceSection {
    cpus: Option<u32>,
    memory: Option<u32>,
    disk: Option<u32>,
    nodes: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct Policies {
    placement: Option<PlacementPolicy>,
}

#[derive(Debug, Default, Deserialize)]
struct PlacementPolicy {
    requirements: Option<SiteRegions>,
    preferences: Option<SiteRegions>,
}

#[derive(Debug, Default, Deserialize)]
struct SiteRegions {
    sites: Option<Vec<String>>,
    regions: Option<Vec<String>>,
}

/// Correlation id shared by all routing attempts of one job instance.
pub fn correlation_id(record: &JobRecord) -> String {
    match record.unique_id.as_deref().filter(|uid| !uid.is_empty()) {
        Some(uid) => format!("{uid}-{}", record.factory_id),
        None => record.label(),
    }
}

/// Build the deployment request for `record` from its job description.
///
/// A job-level site requirement replaces every configured placement hint; a
/// region requirement replaces the configured regions. Job-level preferences
/// always win over configured ones.
pub fn build(
    record: &JobRecord,
    correlation_id: &str,
    description: &Value,
    defaults: &DeploymentDefaults,
) -> AppResult<DeploymentRequest> {
    let identity = record
        .owner
        .clone()
        .filter(|owner| !owner.is_empty())
        .ok_or_else(|| {
            AppError::invalid_record("job has no owner identity").with_context(record.label())
        })?;
    let parsed: Description = serde_json::from_value(description.clone()).map_err(|err| {
        AppError::invalid_record(format!("malformed job description: {err}"))
            .with_context(record.label())
    })?;

    let section = parsed.resources.unwrap_or_default();
    let base = defaults.resources;
    let resources = Resources {
        cpus: section.cpus.unwrap_or(base.cpus),
        memory_gb: section.memory.unwrap_or(base.memory_gb),
        disk_gb: section.disk.unwrap_or(base.disk_gb),
        nodes: section.nodes.unwrap_or(base.nodes),
    };

    let mut placement = defaults.placement.clone();
    let policy = parsed
        .policies
        .and_then(|p| p.placement)
        .unwrap_or_default();
    if let Some(required) = policy.requirements {
        if let Some(sites) = required.sites {
            placement = Placement {
                required_sites: sites,
                ..Placement::default()
            };
        }
        if let Some(regions) = required.regions {
            placement.required_regions = regions;
            placement.preferred_regions.clear();
        }
    }
    if let Some(preferred) = policy.preferences {
        if let Some(sites) = preferred.sites {
            placement.preferred_sites = sites;
        }
        if let Some(regions) = preferred.regions {
            placement.preferred_regions = regions;
        }
    }

    Ok(DeploymentRequest {
        identity,
        groups: record.groups.clone(),
        working_directory: record.working_directory.clone(),
        correlation_id: correlation_id.to_string(),
        job_label: record.label(),
        resources,
        placement,
    })
}
