// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Scheduler queue and history through the HTCondor command-line tools.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::JobRecordStorePort;
use crate::app::services::classad::{AdValue, ClassAd, ClassAdError};

#[derive(Debug, Error)]
pub enum CondorError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} timed out after {secs}s")]
    Timeout { program: String, secs: u64 },
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },
    #[error("unparseable output from {program}: {source}")]
    Parse {
        program: String,
        #[source]
        source: ClassAdError,
    },
}

fn map_condor_error(err: CondorError) -> AppError {
    let kind = match err {
        CondorError::Timeout { .. } => AppErrorKind::Timeout,
        CondorError::Parse { .. } => AppErrorKind::InvalidData,
        CondorError::Spawn { .. } | CondorError::Failed { .. } => AppErrorKind::Unavailable,
    };
    AppError::with_message(kind, codes::SCHEDULER_ERROR, err.to_string())
}

#[derive(Debug, Clone)]
pub struct CondorTools {
    pub q_bin: String,
    pub history_bin: String,
    pub qedit_bin: String,
    pub timeout: Duration,
}

impl Default for CondorTools {
    fn default() -> Self {
        Self {
            q_bin: "condor_q".to_string(),
            history_bin: "condor_history".to_string(),
            qedit_bin: "condor_qedit".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Clone)]
pub struct CondorCli {
    tools: CondorTools,
}

impl CondorCli {
    pub fn new(tools: CondorTools) -> Self {
        Self { tools }
    }

    async fn run(&self, program: &str, args: &[String]) -> Result<String, CondorError> {
        tracing::debug!(program, ?args, "running scheduler tool");
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.tools.timeout, command.output()).await {
            Ok(result) => result.map_err(|source| CondorError::Spawn {
                program: program.to_string(),
                source,
            })?,
            Err(_) => {
                return Err(CondorError::Timeout {
                    program: program.to_string(),
                    secs: self.tools.timeout.as_secs(),
                });
            }
        };

        if !output.status.success() {
            return Err(CondorError::Failed {
                program: program.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn query(&self, program: &str, args: Vec<String>) -> AppResult<Vec<ClassAd>> {
        let stdout = self.run(program, &args).await.map_err(map_condor_error)?;
        ClassAd::parse_many(&stdout)
            .map_err(|source| CondorError::Parse {
                program: program.to_string(),
                source,
            })
            .map_err(map_condor_error)
    }
}

fn query_args(constraint: &str, attributes: &[&str]) -> Vec<String> {
    let mut args = vec![
        "-long".to_string(),
        "-constraint".to_string(),
        constraint.to_string(),
    ];
    if !attributes.is_empty() {
        args.push("-attributes".to_string());
        args.push(attributes.join(","));
    }
    args
}

fn history_args(constraint: &str, attributes: &[&str], limit: usize) -> Vec<String> {
    let mut args = query_args(constraint, attributes);
    args.push("-limit".to_string());
    args.push(limit.to_string());
    args
}

fn qedit_args(constraint: &str, attribute: &str, value: &AdValue) -> Vec<String> {
    vec![
        "-constraint".to_string(),
        constraint.to_string(),
        attribute.to_string(),
        value.to_string(),
    ]
}

#[async_trait]
impl JobRecordStorePort for CondorCli {
    async fn query_live(&self, constraint: &str, attributes: &[&str]) -> AppResult<Vec<ClassAd>> {
        self.query(&self.tools.q_bin, query_args(constraint, attributes))
            .await
    }

    async fn query_history(
        &self,
        constraint: &str,
        attributes: &[&str],
        limit: usize,
    ) -> AppResult<Vec<ClassAd>> {
        self.query(
            &self.tools.history_bin,
            history_args(constraint, attributes, limit),
        )
        .await
    }

    async fn mutate(&self, constraint: &str, attribute: &str, value: &AdValue) -> AppResult<()> {
        self.run(&self.tools.qedit_bin, &qedit_args(constraint, attribute, value))
            .await
            .map(|_| ())
            .map_err(map_condor_error)
    }
}
