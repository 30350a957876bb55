// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::ops::Range;

use regex::Regex;
use time::PrimitiveDateTime;
use time::macros::format_description;
use url::Url;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};

/// Locates pre-signed URLs for one storage endpoint and bucket.
#[derive(Debug, Clone)]
pub struct PresignedUrlMatcher {
    pattern: Regex,
    prefix: String,
}

impl PresignedUrlMatcher {
    pub fn new(storage_url: &str, bucket: &str) -> AppResult<Self> {
        let base = storage_url.trim_end_matches('/');
        let prefix = format!("{base}/{bucket}/");
        let pattern = Regex::new(&format!(
            r"{}[\w/%&=?.\-]+",
            regex::escape(&prefix)
        ))
        .map_err(|err| {
            AppError::with_message(
                AppErrorKind::InvalidArgument,
                codes::INVALID_ARGUMENT,
                format!("invalid storage url pattern: {err}"),
            )
        })?;
        Ok(Self { pattern, prefix })
    }

    /// Byte ranges of every match, including repeats.
    pub fn spans(&self, text: &str) -> Vec<Range<usize>> {
        self.pattern.find_iter(text).map(|m| m.range()).collect()
    }

    pub fn is_match(&self, url: &str) -> bool {
        self.pattern
            .find(url)
            .is_some_and(|m| m.start() == 0 && m.end() == url.len())
    }

    /// Object key: path after `/<bucket>/`, percent-decoded.
    pub fn object_key(&self, url: &str) -> Option<String> {
        let rest = url.strip_prefix(&self.prefix)?;
        let path = rest.split('?').next().unwrap_or(rest);
        if path.is_empty() {
            return None;
        }
        urlencoding::decode(path).ok().map(|key| key.into_owned())
    }
}

/// Epoch second a pre-signed URL stops working; 0 when none can be read.
pub fn expiry_epoch(url: &str) -> i64 {
    let Ok(parsed) = Url::parse(url) else {
        return 0;
    };
    let mut expires = None;
    let mut amz_date = None;
    let mut amz_expires = None;
    for (key, value) in parsed.query_pairs() {
        match key.as_ref() {
            "Expires" => expires = value.parse::<i64>().ok(),
            "X-Amz-Date" => amz_date = parse_amz_date(&value),
            "X-Amz-Expires" => amz_expires = value.parse::<i64>().ok(),
            _ => {}
        }
    }
    if let Some(epoch) = expires {
        return epoch;
    }
    match (amz_date, amz_expires) {
        (Some(signed_at), Some(ttl)) => signed_at + ttl,
        _ => 0,
    }
}

fn parse_amz_date(raw: &str) -> Option<i64> {
    let format = format_description!("[year][month][day]T[hour][minute][second]Z");
    PrimitiveDateTime::parse(raw, format)
        .ok()
        .map(|dt| dt.assume_utc().unix_timestamp())
}

/// True when less than `threshold_secs` of lifetime remain.
pub fn needs_refresh(url: &str, now: i64, threshold_secs: i64) -> bool {
    expiry_epoch(url) - now < threshold_secs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> PresignedUrlMatcher {
        PresignedUrlMatcher::new("https://s3.example.org", "jobs").unwrap()
    }

    #[test]
    fn finds_urls_embedded_in_arguments() {
        let args = "--in https://s3.example.org/jobs/u1/in.tgz?Expires=1700000000&Signature=a%2Fb \
                    --out https://s3.example.org/jobs/u1/out.tgz?Expires=1700000001 \
                    --other https://elsewhere.org/jobs/x";
        let found: Vec<&str> = matcher()
            .spans(args)
            .into_iter()
            .map(|span| &args[span])
            .collect();
        assert_eq!(
            found,
            vec![
                "https://s3.example.org/jobs/u1/in.tgz?Expires=1700000000&Signature=a%2Fb",
                "https://s3.example.org/jobs/u1/out.tgz?Expires=1700000001",
            ]
        );
    }

    #[test]
    fn repeated_urls_get_one_span_each() {
        let url = "https://s3.example.org/jobs/a?Expires=1";
        let text = format!("{url} {url}");
        let spans = matcher().spans(&text);
        assert_eq!(spans.len(), 2);
        assert_eq!(&text[spans[1].clone()], url);
    }

    #[test]
    fn object_key_strips_bucket_and_query() {
        let m = matcher();
        assert_eq!(
            m.object_key("https://s3.example.org/jobs/uploads/alice/my%20file.txt?Expires=1"),
            Some("uploads/alice/my file.txt".to_string())
        );
        assert_eq!(m.object_key("https://s3.example.org/other/x"), None);
    }

    #[test]
    fn reads_sigv2_expiry() {
        assert_eq!(
            expiry_epoch("https://s3.example.org/jobs/a?AWSAccessKeyId=k&Expires=1700000000"),
            1_700_000_000
        );
    }

    #[test]
    fn reads_sigv4_expiry() {
        let url = "https://s3.example.org/jobs/a?X-Amz-Algorithm=AWS4-HMAC-SHA256\
                   &X-Amz-Date=20231114T221320Z&X-Amz-Expires=3600";
        assert_eq!(expiry_epoch(url), 1_700_000_000 + 3600);
    }

    #[test]
    fn url_without_expiry_always_needs_refresh() {
        assert_eq!(expiry_epoch("https://s3.example.org/jobs/a"), 0);
        assert!(needs_refresh("https://s3.example.org/jobs/a", 1_000, 10));
    }

    #[test]
    fn threshold_comparison() {
        let now = 1_700_000_000;
        let url = format!("https://s3.example.org/jobs/a?Expires={}", now + 3600);
        assert!(needs_refresh(&url, now, 5 * 86_400));
        let url = format!("https://s3.example.org/jobs/a?Expires={}", now + 10 * 86_400);
        assert!(!needs_refresh(&url, now, 5 * 86_400));
    }

    #[test]
    fn full_match_only() {
        let m = matcher();
        assert!(m.is_match("https://s3.example.org/jobs/a/b?Expires=1"));
        assert!(!m.is_match("see https://s3.example.org/jobs/a/b"));
    }
}
