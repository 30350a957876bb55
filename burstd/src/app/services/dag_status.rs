// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Workflow progress files written by the DAG manager.
//!
//! `workflow.dag.status` is a sequence of bracketed ads (`[ Name = value; ... ]`)
//! with trailing `/* ... */` comments; the `DagStatus` typed ad carries totals.

use std::sync::LazyLock;

use regex::Regex;
use time::{Date, Month, PrimitiveDateTime, Time};

use crate::app::errors::{AppError, AppResult};
use crate::app::services::classad::ClassAd;
use crate::app::types::DagProgress;

pub const STATUS_FILE: &str = "workflow.dag.status";
pub const DAGMAN_LOG: &str = "job.dag.dagman.out";

/// Split a node status file into old-style ad blocks.
fn normalise(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current = String::new();
    let mut in_list = false;
    for raw in text.lines() {
        let line = strip_comment(raw).trim();
        if in_list {
            if line.contains('}') {
                in_list = false;
            }
            continue;
        }
        match line {
            "" => continue,
            "[" => {
                current.clear();
                continue;
            }
            "]" => {
                if !current.is_empty() {
                    blocks.push(std::mem::take(&mut current));
                }
                continue;
            }
            _ => {}
        }
        let line = line.trim_end_matches(';').trim();
        if let Some((_, value)) = line.split_once('=') {
            let value = value.trim();
            if value.starts_with('{') {
                in_list = !value.contains('}');
                continue;
            }
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    blocks
}

fn strip_comment(line: &str) -> &str {
    match line.find("/*") {
        Some(idx) => &line[..idx],
        None => line,
    }
}

/// Progress from the first `DagStatus` ad, or `None` if the file has none.
pub fn parse_progress(text: &str) -> AppResult<Option<DagProgress>> {
    for block in normalise(text) {
        let ad = ClassAd::parse(&block).map_err(|err| {
            AppError::invalid_record(format!("malformed DAG status file: {err}"))
        })?;
        if ad.get_str("Type") != Some("DagStatus") {
            continue;
        }
        let field = |name: &str| {
            ad.get_i64(name).ok_or_else(|| {
                AppError::invalid_record(format!("DAG status ad has no {name}"))
            })
        };
        return Ok(Some(DagProgress {
            dag_status: field("DagStatus")?,
            nodes_total: field("NodesTotal").unwrap_or(0),
            nodes_done: field("NodesDone").unwrap_or(0),
            nodes_failed: field("NodesFailed").unwrap_or(0),
        }));
    }
    Ok(None)
}

static TIMESTAMP: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(\d\d)/(\d\d)/(\d\d)\s(\d\d):(\d\d):(\d\d)").ok());

/// Epoch of the `MM/DD/YY HH:MM:SS` prefix on the DAG manager log's first line (UTC).
pub fn parse_start_time(log: &str) -> Option<i64> {
    let first = log.lines().next()?;
    let caps = TIMESTAMP.as_ref()?.captures(first)?;
    let num = |idx: usize| caps.get(idx)?.as_str().parse::<u8>().ok();
    let month = Month::try_from(num(1)?).ok()?;
    let date = Date::from_calendar_date(2000 + i32::from(num(3)?), month, num(2)?).ok()?;
    let time = Time::from_hms(num(4)?, num(5)?, num(6)?).ok()?;
    Some(PrimitiveDateTime::new(date, time).assume_utc().unix_timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATUS: &str = r#"[
  Type = "DagStatus";
  DagFiles = {
    "job.dag"
  };
  Timestamp = 1700000000; /* "Tue Nov 14 22:13:20 2023" */
  DagStatus = 3; /* "STATUS_SUBMITTED ()" */
  NodesTotal = 4;
  NodesDone = 1;
  NodesPre = 0;
  NodesFailed = 0;
]
[
  Type = "NodeStatus";
  Node = "A";
  NodeStatus = 5; /* "STATUS_DONE" */
]
"#;

    #[test]
    fn reads_dag_status_ad() {
        let progress = parse_progress(STATUS).unwrap().unwrap();
        assert_eq!(
            progress,
            DagProgress {
                dag_status: 3,
                nodes_total: 4,
                nodes_done: 1,
                nodes_failed: 0,
            }
        );
        assert!(progress.is_running());
    }

    #[test]
    fn file_without_dag_status_yields_none() {
        let text = "[\n  Type = \"NodeStatus\";\n  Node = \"A\";\n]\n";
        assert_eq!(parse_progress(text).unwrap(), None);
    }

    #[test]
    fn dag_status_without_code_is_an_error() {
        let text = "[\n  Type = \"DagStatus\";\n  NodesTotal = 2;\n]\n";
        assert!(parse_progress(text).is_err());
    }

    #[test]
    fn start_time_from_first_log_line() {
        let log = "11/14/23 22:13:20 ******************************************************\n\
                   11/14/23 22:13:21 ** condor_scheduniv_exec.108.0 (CONDOR_DAGMAN) STARTING UP\n";
        assert_eq!(parse_start_time(log), Some(1_700_000_000));
    }

    #[test]
    fn start_time_absent_when_prefix_missing() {
        assert_eq!(parse_start_time(""), None);
        assert_eq!(parse_start_time("starting up\n"), None);
        assert_eq!(parse_start_time("13/40/23 22:13:20 bad date\n"), None);
    }
}
