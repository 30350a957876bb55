// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::app::services::stats::ExecutionStats;
use crate::app::types::JobRecord;

/// Accounting document for one finished job.
///
/// Starts from the user's job description with inline input contents blanked,
/// then adds execution details and scheduler timings.
pub fn build(description: Value, record: &JobRecord, stats: Option<&ExecutionStats>) -> Value {
    let mut doc = match description {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    if let Some(inputs) = doc.get_mut("inputs").and_then(Value::as_array_mut) {
        for input in inputs {
            if let Some(content) = input.get_mut("content") {
                *content = Value::String(String::new());
            }
        }
    }

    let mut execution = Map::new();
    if let Some(site) = record.site() {
        execution.insert("site".into(), json!(site));
    }
    if let Some(infra) = &record.infra {
        execution.insert("type".into(), json!(infra.kind.as_str()));
        if let Some(id) = record.infra_id() {
            execution.insert("id".into(), json!(id));
        }
    }
    if let Some(stats) = stats {
        if let Some(kb) = stats.max_memory_kb {
            execution.insert("maxMemoryUsageKB".into(), json!(kb));
        }
        execution.insert("tasks".into(), Value::Array(stats.tasks.clone()));
    }
    doc.insert("execution".into(), Value::Object(execution));

    doc.insert("id".into(), json!(record.job_id));
    doc.insert("uid".into(), json!(record.unique_id));
    doc.insert("username".into(), json!(record.owner));
    doc.insert("group".into(), json!(record.groups_joined()));
    doc.insert("type".into(), json!(record.job_type));
    if let Some(date) = record.submitted_at.and_then(rfc3339) {
        doc.insert("date".into(), json!(date));
    }
    doc.insert(
        "events".into(),
        json!({ "createTime": record.submitted_at }),
    );

    let mut scheduler = Map::new();
    scheduler.insert("JobStatus".into(), json!(record.status.code()));
    if let Some(code) = record.exit_code {
        scheduler.insert("ExitCode".into(), json!(code));
    }
    if let Some(start) = record.started_at.filter(|v| *v > 0) {
        scheduler.insert("JobStartDate".into(), json!(start));
    }
    if let Some(done) = record.completed_at.filter(|v| *v > 0) {
        scheduler.insert("CompletionDate".into(), json!(done));
    }
    doc.insert("scheduler".into(), Value::Object(scheduler));

    Value::Object(doc)
}

fn rfc3339(epoch: i64) -> Option<String> {
    OffsetDateTime::from_unix_timestamp(epoch)
        .ok()
        .and_then(|dt| dt.format(&Rfc3339).ok())
}
