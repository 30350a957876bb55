// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Job router hook framing on stdin/stdout.

use std::sync::LazyLock;

use regex::Regex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::services::classad::ClassAd;

const SEPARATOR: &str = "------";

static ROUTE_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?i)\bname\s*=\s*"([\w\-]+)""#).ok());

#[derive(Debug, Clone, PartialEq)]
pub struct TranslateInput {
    pub route_name: Option<String>,
    pub job: ClassAd,
}

fn parse_ad(text: &str) -> AppResult<ClassAd> {
    let ad = ClassAd::parse(text)
        .map_err(|err| AppError::invalid_record(format!("unreadable job ad: {err}")))?;
    if ad.is_empty() {
        return Err(AppError::invalid_record("empty job ad on stdin"));
    }
    Ok(ad)
}

/// Route ad, a `------` line, then the job ad.
pub fn parse_translate_input(text: &str) -> AppResult<TranslateInput> {
    let Some((route, job)) = text.split_once(SEPARATOR) else {
        return Err(AppError::invalid_record(
            "translate input has no route/job separator",
        ));
    };
    let route_name = ROUTE_NAME
        .as_ref()
        .and_then(|re| re.captures(route))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());
    let job = job.trim_start_matches('-');
    Ok(TranslateInput {
        route_name,
        job: parse_ad(job)?,
    })
}

pub fn parse_job_input(text: &str) -> AppResult<ClassAd> {
    parse_ad(text)
}

fn stdio_error(action: &str, err: std::io::Error) -> AppError {
    AppError::with_message(
        AppErrorKind::Internal,
        codes::LOCAL_ERROR,
        format!("failed to {action}: {err}"),
    )
}

pub async fn read_stdin() -> AppResult<String> {
    let mut text = String::new();
    tokio::io::stdin()
        .read_to_string(&mut text)
        .await
        .map_err(|err| stdio_error("read stdin", err))?;
    Ok(text)
}

pub async fn write_ad(ad: &ClassAd) -> AppResult<()> {
    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(ad.to_string().as_bytes())
        .await
        .map_err(|err| stdio_error("write stdout", err))?;
    stdout
        .flush()
        .await
        .map_err(|err| stdio_error("flush stdout", err))
}
