// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Execution statistics written by the job wrapper and what is derived from them.

use serde_json::Value;

/// Parsed `promlet.<n>.json`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionStats {
    /// Per-task entries, without the memory summary pseudo-task.
    pub tasks: Vec<Value>,
    pub max_memory_kb: Option<i64>,
    pub cpu_secs: i64,
    pub wall_secs: i64,
}

impl ExecutionStats {
    pub fn from_json(doc: &Value) -> Self {
        let mut stats = Self::default();
        let Some(tasks) = doc.get("tasks").and_then(Value::as_array) else {
            return stats;
        };
        for task in tasks {
            if let Some(kb) = task.get("maxMemoryUsageKB").and_then(as_whole) {
                stats.max_memory_kb = Some(kb);
                continue;
            }
            stats.cpu_secs += task.get("cpuTimeUsage").and_then(as_whole).unwrap_or(0);
            stats.wall_secs += task.get("wallTimeUsage").and_then(as_whole).unwrap_or(0);
            stats.tasks.push(task.clone());
        }
        stats
    }

    pub fn memory_mb(&self) -> i64 {
        self.max_memory_kb.unwrap_or(0) / 1000
    }
}

fn as_whole(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|v| v as i64))
}

/// `D+HH:MM:SS`.
pub fn format_duration(secs: i64) -> String {
    let secs = secs.max(0);
    let days = secs / 86_400;
    let rem = secs % 86_400;
    format!(
        "{days}+{:02}:{:02}:{:02}",
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60
    )
}

pub fn notification_subject(job_id: i64, name: Option<&str>) -> String {
    match name.filter(|n| !n.is_empty()) {
        Some(name) => format!("Your job with id {job_id} ({name}) has finished"),
        None => format!("Your job with id {job_id} has finished"),
    }
}

pub fn notification_body(stats: &ExecutionStats, site: Option<&str>) -> String {
    format!(
        "CPU time usage   {}\n\
         Wall time usage  {}\n\
         Memory usage     {} MB\n\
         \n\
         Site             {}\n\
         \n\
         \n\
         --\n\
         Please do not reply to this email",
        format_duration(stats.cpu_secs),
        format_duration(stats.wall_secs),
        stats.memory_mb(),
        site.unwrap_or("unknown"),
    )
}

/// Influx line protocol datapoint for one finished job.
pub fn metrics_line(
    owner: &str,
    site: Option<&str>,
    job_id: i64,
    stats: &ExecutionStats,
) -> String {
    format!(
        "accounting,identity={},infra_site={} job_id={job_id},walltime={},cputime={}\n",
        escape_tag(owner),
        escape_tag(site.unwrap_or("unknown")),
        stats.wall_secs,
        stats.cpu_secs,
    )
}

fn escape_tag(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, ',' | '=' | ' ') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
