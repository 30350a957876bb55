// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Mapping between scheduler job ads and [`JobRecord`].

use std::path::PathBuf;

use crate::app::errors::{AppError, AppResult};
use crate::app::services::classad::{AdValue, ClassAd};
use crate::app::types::{InfraInfo, InfraState, InfraType, JobRecord, JobStatus};

pub mod attr {
    pub const CLUSTER_ID: &str = "ClusterId";
    pub const PROC_ID: &str = "ProcId";
    pub const JOB_STATUS: &str = "JobStatus";
    pub const IWD: &str = "Iwd";
    pub const ARGUMENTS: &str = "Arguments";
    pub const REQUIREMENTS: &str = "Requirements";
    pub const ROUTED_FROM: &str = "RoutedFromJobId";
    pub const ROUTED_TO: &str = "RoutedToJobId";
    pub const ROUTED_BY: &str = "RoutedBy";
    pub const ROUTE_NAME: &str = "RouteName";
    pub const QDATE: &str = "QDate";
    pub const JOB_START_DATE: &str = "JobStartDate";
    pub const COMPLETION_DATE: &str = "CompletionDate";
    pub const EXIT_CODE: &str = "ExitCode";
    pub const ENTERED_CURRENT_STATUS: &str = "EnteredCurrentStatus";

    pub const UNIQUE_ID: &str = "BurstJobUniqueIdentifier";
    pub const FACTORY_ID: &str = "BurstFactoryId";
    pub const IDENTITY: &str = "BurstIdentity";
    pub const GROUP: &str = "BurstGroup";
    pub const EMAIL: &str = "BurstEmail";
    pub const NAME: &str = "BurstName";
    pub const TYPE: &str = "BurstType";
    pub const INFRA_ID: &str = "BurstInfrastructureId";
    pub const INFRA_STATE: &str = "BurstInfrastructureState";
    pub const INFRA_SITE: &str = "BurstInfrastructureSite";
    pub const INFRA_TYPE: &str = "BurstInfrastructureType";
    pub const INFRA_ENTERED_STATUS: &str = "BurstInfrastructureEnteredCurrentStatus";
    pub const LAST_ROUTED: &str = "BurstLastRouted";
    pub const WANT_CLUSTER: &str = "BurstWantCluster";
    pub const BURST_PROC_ID: &str = "BurstProcId";
    pub const PROCESSED: &str = "BurstProcessed";
    pub const MACHINE_SITE: &str = "MachineAttrBurstCloud0";
}

/// Attributes requested from the scheduler when loading completed jobs.
pub const RECORD_ATTRIBUTES: &[&str] = &[
    attr::CLUSTER_ID,
    attr::PROC_ID,
    attr::JOB_STATUS,
    attr::IWD,
    attr::ARGUMENTS,
    attr::ROUTED_FROM,
    attr::ROUTED_TO,
    attr::ROUTED_BY,
    attr::ROUTE_NAME,
    attr::QDATE,
    attr::JOB_START_DATE,
    attr::COMPLETION_DATE,
    attr::EXIT_CODE,
    attr::ENTERED_CURRENT_STATUS,
    attr::UNIQUE_ID,
    attr::FACTORY_ID,
    attr::IDENTITY,
    attr::GROUP,
    attr::EMAIL,
    attr::NAME,
    attr::TYPE,
    attr::INFRA_ID,
    attr::INFRA_STATE,
    attr::INFRA_SITE,
    attr::INFRA_TYPE,
    attr::MACHINE_SITE,
];

/// Gate placed on a routed job so it only matches once its infrastructure is up.
pub const CONFIGURED_REQUIREMENT: &str = "MY.BurstInfrastructureState =?= \"configured\"";

fn opt_string(ad: &ClassAd, name: &str) -> Option<String> {
    ad.get(name).and_then(|value| match value {
        AdValue::String(s) if !s.is_empty() => Some(s.clone()),
        AdValue::String(_) | AdValue::Undefined => None,
        AdValue::Integer(v) => Some(v.to_string()),
        other => Some(other.to_string()),
    })
}

/// Decode a job ad. `ClusterId`, `Iwd` and a known `JobStatus` are required.
pub fn decode(ad: &ClassAd) -> AppResult<JobRecord> {
    let job_id = ad
        .get_i64(attr::CLUSTER_ID)
        .ok_or_else(|| AppError::invalid_record("job ad has no ClusterId"))?;
    let label = || format!("job {job_id}");

    let code = ad
        .get_i64(attr::JOB_STATUS)
        .ok_or_else(|| AppError::invalid_record("job ad has no JobStatus").with_context(label()))?;
    let status = JobStatus::from_code(code).ok_or_else(|| {
        AppError::invalid_record(format!("unknown JobStatus {code}")).with_context(label())
    })?;

    let working_directory = opt_string(ad, attr::IWD)
        .map(PathBuf::from)
        .ok_or_else(|| AppError::invalid_record("job ad has no Iwd").with_context(label()))?;

    let infra_id = opt_string(ad, attr::INFRA_ID);
    let infra_state = opt_string(ad, attr::INFRA_STATE);
    let infra_site = opt_string(ad, attr::INFRA_SITE);
    let infra_type = opt_string(ad, attr::INFRA_TYPE);
    let infra = if infra_id.is_some()
        || infra_state.is_some()
        || infra_site.is_some()
        || infra_type.is_some()
    {
        let kind = match infra_type.as_deref() {
            Some(raw) => raw.parse::<InfraType>().map_err(|err| {
                AppError::invalid_record(err).with_context(label())
            })?,
            None => InfraType::default(),
        };
        Some(InfraInfo {
            id: infra_id,
            state: infra_state
                .as_deref()
                .map(|raw| raw.parse::<InfraState>().unwrap_or(InfraState::None))
                .unwrap_or(InfraState::None),
            site: infra_site,
            kind,
        })
    } else {
        None
    };

    let groups = opt_string(ad, attr::GROUP)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|g| !g.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(JobRecord {
        job_id,
        sub_id: ad.get_i64(attr::PROC_ID).unwrap_or(0),
        unique_id: opt_string(ad, attr::UNIQUE_ID),
        factory_id: ad.get_i64(attr::FACTORY_ID).unwrap_or(0),
        owner: opt_string(ad, attr::IDENTITY),
        groups,
        email: opt_string(ad, attr::EMAIL),
        name: opt_string(ad, attr::NAME),
        job_type: opt_string(ad, attr::TYPE),
        status,
        working_directory,
        arguments: ad.get_str(attr::ARGUMENTS).map(str::to_string),
        infra,
        routed_from: ad.get_i64(attr::ROUTED_FROM),
        routed_to: ad.get_i64(attr::ROUTED_TO),
        routed_by: opt_string(ad, attr::ROUTED_BY),
        route_name: opt_string(ad, attr::ROUTE_NAME),
        machine_site: opt_string(ad, attr::MACHINE_SITE),
        submitted_at: ad.get_i64(attr::QDATE),
        started_at: ad.get_i64(attr::JOB_START_DATE),
        completed_at: ad.get_i64(attr::COMPLETION_DATE),
        entered_status_at: ad.get_i64(attr::ENTERED_CURRENT_STATUS),
        exit_code: ad.get_i64(attr::EXIT_CODE),
    })
}

/// Scheduler constraint selecting exactly one job.
pub fn job_constraint(job_id: i64) -> String {
    format!("{} == {job_id}", attr::CLUSTER_ID)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::errors::AppErrorKind;

    fn ad(text: &str) -> ClassAd {
        ClassAd::parse(text).unwrap()
    }

    const ROUTED_COPY: &str = r#"ClusterId = 108
ProcId = 0
JobStatus = 4
Iwd = "/sandbox/4f1c"
BurstJobUniqueIdentifier = "4f1c"
BurstFactoryId = 2
BurstIdentity = "alice"
BurstGroup = "physics,astro"
BurstType = "job"
BurstInfrastructureId = "infra-123"
BurstInfrastructureState = "configured"
BurstInfrastructureSite = "cloud-site-a"
RoutedFromJobId = 107
RoutedBy = "jobrouter"
RouteName = "cloud-site-a"
QDate = 1700000000
JobStartDate = 1700000100
CompletionDate = 1700003700
ExitCode = 0
"#;

    #[test]
    fn decodes_routed_copy() {
        let record = decode(&ad(ROUTED_COPY)).unwrap();
        assert_eq!(record.job_id, 108);
        assert_eq!(record.status, JobStatus::Completed);
        assert_eq!(record.factory_id, 2);
        assert_eq!(record.groups, vec!["physics".to_string(), "astro".to_string()]);
        assert_eq!(record.infra_id(), Some("infra-123"));
        assert_eq!(record.infra_type(), InfraType::Cloud);
        assert_eq!(record.routed_from, Some(107));
        assert_eq!(record.completed_at, Some(1_700_003_700));
        assert_eq!(record.kind(), crate::app::types::JobKind::RoutedCopy);
    }

    #[test]
    fn infra_absent_without_infra_attributes() {
        let record =
            decode(&ad("ClusterId = 5\nJobStatus = 1\nIwd = \"/sandbox/x\"\n")).unwrap();
        assert!(record.infra.is_none());
        assert_eq!(record.sub_id, 0);
        assert!(record.groups.is_empty());
    }

    #[test]
    fn missing_required_attributes_are_data_errors() {
        let err = decode(&ad("JobStatus = 1\nIwd = \"/x\"\n")).unwrap_err();
        assert_eq!(err.kind(), AppErrorKind::InvalidData);

        let err = decode(&ad("ClusterId = 9\nJobStatus = 1\n")).unwrap_err();
        assert_eq!(err.context(), Some("job 9"));

        let err = decode(&ad("ClusterId = 9\nJobStatus = 8\nIwd = \"/x\"\n")).unwrap_err();
        assert!(err.message().contains("unknown JobStatus 8"));
    }

    #[test]
    fn batch_type_is_decoded() {
        let record = decode(&ad(
            "ClusterId = 5\nJobStatus = 4\nIwd = \"/x\"\nBurstInfrastructureType = \"batch\"\n",
        ))
        .unwrap();
        assert_eq!(record.infra_type(), InfraType::Batch);
        assert!(record.infra_id().is_none());
    }
}
