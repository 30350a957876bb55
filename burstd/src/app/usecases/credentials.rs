// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::app::errors::{AppError, AppResult};
use crate::app::ports::{ClockPort, LocalFilesystemPort, UrlIssuerPort};
use crate::app::services::presigned::{self, PresignedUrlMatcher};
use crate::app::types::UrlVerb;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageTarget {
    pub url: String,
    pub bucket: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshPolicy {
    /// `None` (or an empty url) turns the refresher into a no-op.
    pub storage: Option<StorageTarget>,
    pub threshold: Duration,
    pub lifetime: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            storage: None,
            threshold: Duration::from_secs(5 * 86_400),
            lifetime: Duration::from_secs(7 * 86_400),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshOutcome {
    pub args: String,
    pub replaced: usize,
}

/// Description fields holding URLs and the verb their replacement needs.
const URL_FIELDS: &[(&str, UrlVerb)] = &[
    ("artifacts", UrlVerb::Get),
    ("outputFiles", UrlVerb::Put),
    ("outputDirs", UrlVerb::Put),
];

#[derive(Clone)]
pub struct CredentialRefresher {
    issuer: Arc<dyn UrlIssuerPort>,
    fs: Arc<dyn LocalFilesystemPort>,
    clock: Arc<dyn ClockPort>,
    policy: RefreshPolicy,
}

impl CredentialRefresher {
    pub fn new(
        issuer: Arc<dyn UrlIssuerPort>,
        fs: Arc<dyn LocalFilesystemPort>,
        clock: Arc<dyn ClockPort>,
        policy: RefreshPolicy,
    ) -> Self {
        Self {
            issuer,
            fs,
            clock,
            policy,
        }
    }

    /// Replace soon-to-expire URLs in `args` and in the mapped description.
    ///
    /// The description is rewritten only if one of its URLs changed.
    pub async fn refresh(
        &self,
        args: &str,
        mapped_description: &Path,
    ) -> AppResult<RefreshOutcome> {
        let Some(target) = self
            .policy
            .storage
            .as_ref()
            .filter(|target| !target.url.trim().is_empty())
        else {
            return Ok(RefreshOutcome {
                args: args.to_string(),
                replaced: 0,
            });
        };
        let matcher = PresignedUrlMatcher::new(&target.url, &target.bucket)?;
        let now = self.clock.now_epoch();

        let (args, in_args) = self.refresh_args(&matcher, target, args, now).await?;
        let in_file = self
            .refresh_description(&matcher, target, mapped_description, now)
            .await?;

        Ok(RefreshOutcome {
            args,
            replaced: in_args + in_file,
        })
    }

    async fn refresh_args(
        &self,
        matcher: &PresignedUrlMatcher,
        target: &StorageTarget,
        args: &str,
        now: i64,
    ) -> AppResult<(String, usize)> {
        let mut out = String::with_capacity(args.len());
        let mut cursor = 0;
        let mut replaced = 0;
        for span in matcher.spans(args) {
            let url = &args[span.clone()];
            out.push_str(&args[cursor..span.start]);
            cursor = span.end;
            match self.fresh_url(matcher, target, url, UrlVerb::Put, now).await? {
                Some(fresh) => {
                    out.push_str(&fresh);
                    replaced += 1;
                }
                None => out.push_str(url),
            }
        }
        out.push_str(&args[cursor..]);
        Ok((out, replaced))
    }

    async fn refresh_description(
        &self,
        matcher: &PresignedUrlMatcher,
        target: &StorageTarget,
        path: &Path,
        now: i64,
    ) -> AppResult<usize> {
        let original = self
            .fs
            .read_to_string(path)
            .await
            .map_err(|err| err.with_context(format!("reading {}", path.display())))?;
        let mut doc: Value = serde_json::from_str(&original).map_err(|err| {
            AppError::invalid_record(format!("malformed job description: {err}"))
                .with_context(path.display().to_string())
        })?;

        let mut swaps: Vec<(String, String)> = Vec::new();
        for (field, verb) in URL_FIELDS {
            let Some(entries) = doc.get_mut(*field).and_then(Value::as_array_mut) else {
                continue;
            };
            for entry in entries {
                let Some(slot) = entry.get_mut("url") else {
                    continue;
                };
                let Some(url) = slot.as_str().map(str::to_string) else {
                    continue;
                };
                if !matcher.is_match(&url) {
                    continue;
                }
                if let Some(fresh) = self.fresh_url(matcher, target, &url, *verb, now).await? {
                    *slot = Value::String(fresh.clone());
                    swaps.push((url, fresh));
                }
            }
        }
        if swaps.is_empty() {
            return Ok(0);
        }

        let rewritten = substitute_literals(&original, &swaps).map_or_else(
            || serde_json::to_string(&doc).map_err(|err| AppError::local(err.to_string())),
            Ok,
        )?;
        self.fs
            .write_atomic(path, &rewritten)
            .await
            .map_err(|err| err.with_context(format!("rewriting {}", path.display())))?;
        tracing::debug!(path = %path.display(), replaced = swaps.len(), "job description rewritten");
        Ok(swaps.len())
    }

    async fn fresh_url(
        &self,
        matcher: &PresignedUrlMatcher,
        target: &StorageTarget,
        url: &str,
        verb: UrlVerb,
        now: i64,
    ) -> AppResult<Option<String>> {
        let threshold = i64::try_from(self.policy.threshold.as_secs()).unwrap_or(i64::MAX);
        if !presigned::needs_refresh(url, now, threshold) {
            return Ok(None);
        }
        let Some(key) = matcher.object_key(url) else {
            return Ok(None);
        };
        let fresh = self
            .issuer
            .issue(verb, &target.bucket, &key, self.policy.lifetime)
            .await
            .map_err(|err| {
                err.with_context(format!("issuing {} url for {key}", verb.as_method()))
            })?;
        Ok(Some(fresh))
    }
}

/// Swap each old URL's JSON string literal for the new one, leaving every other
/// byte alone. `None` when a literal is missing or ambiguous.
fn substitute_literals(original: &str, swaps: &[(String, String)]) -> Option<String> {
    let mut text = original.to_string();
    for (old, new) in swaps {
        let old_lit = serde_json::to_string(old).ok()?;
        let new_lit = serde_json::to_string(new).ok()?;
        if text.matches(&old_lit).count() != 1 {
            return None;
        }
        text = text.replacen(&old_lit, &new_lit, 1);
    }
    Some(text)
}
