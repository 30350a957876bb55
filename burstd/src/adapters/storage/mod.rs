// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Pre-signed object storage URLs (AWS Signature Version 4, query string form).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use time::macros::format_description;
use url::Url;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::{ClockPort, UrlIssuerPort};
use crate::app::types::UrlVerb;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
/// SigV4 refuses anything longer than a week.
const MAX_EXPIRY_SECS: u64 = 7 * 24 * 3600;

#[derive(Debug, Clone)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
}

#[derive(Clone)]
pub struct S3Presigner {
    endpoint: Url,
    credentials: S3Credentials,
    clock: Arc<dyn ClockPort>,
}

impl S3Presigner {
    pub fn new(
        endpoint: &str,
        credentials: S3Credentials,
        clock: Arc<dyn ClockPort>,
    ) -> AppResult<Self> {
        let endpoint = Url::parse(endpoint).map_err(|err| {
            AppError::with_message(
                AppErrorKind::InvalidArgument,
                codes::INVALID_ARGUMENT,
                format!("invalid storage endpoint {endpoint}: {err}"),
            )
        })?;
        if endpoint.host_str().is_none() {
            return Err(AppError::with_message(
                AppErrorKind::InvalidArgument,
                codes::INVALID_ARGUMENT,
                format!("storage endpoint {endpoint} has no host"),
            ));
        }
        Ok(Self {
            endpoint,
            credentials,
            clock,
        })
    }

    fn host(&self) -> String {
        let host = self.endpoint.host_str().unwrap_or_default();
        match self.endpoint.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    fn origin(&self) -> String {
        format!("{}://{}", self.endpoint.scheme(), self.host())
    }
}

fn issuer_error(message: impl Into<String>) -> AppError {
    AppError::with_message(AppErrorKind::Internal, codes::ISSUER_FAILURE, message)
}

fn hmac(key: &[u8], data: &str) -> AppResult<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|err| issuer_error(format!("invalid signing key: {err}")))?;
    mac.update(data.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Path-style canonical URI; every segment is percent-encoded except `/`.
fn canonical_path(segments: &[&str]) -> String {
    let mut out = String::new();
    for segment in segments {
        for part in segment.split('/') {
            out.push('/');
            out.push_str(&urlencoding::encode(part));
        }
    }
    out
}

struct Presign<'a> {
    method: &'a str,
    host: &'a str,
    path: &'a str,
    credentials: &'a S3Credentials,
    now: OffsetDateTime,
    expires: u64,
}

impl Presign<'_> {
    /// Returns the canonical query string including `X-Amz-Signature`.
    fn query(&self) -> AppResult<String> {
        let amz_date = self
            .now
            .format(format_description!("[year][month][day]T[hour][minute][second]Z"))
            .map_err(|err| issuer_error(format!("unable to format request date: {err}")))?;
        let date_stamp = &amz_date[..8];
        let scope = format!(
            "{date_stamp}/{}/s3/aws4_request",
            self.credentials.region
        );
        let credential = format!("{}/{scope}", self.credentials.access_key_id);

        // Already in byte order of the parameter names.
        let query = format!(
            "X-Amz-Algorithm={ALGORITHM}&X-Amz-Credential={}&X-Amz-Date={amz_date}&X-Amz-Expires={}&X-Amz-SignedHeaders=host",
            urlencoding::encode(&credential),
            self.expires,
        );
        let canonical_request = format!(
            "{}\n{}\n{query}\nhost:{}\n\nhost\nUNSIGNED-PAYLOAD",
            self.method, self.path, self.host
        );
        let string_to_sign = format!(
            "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let secret = format!("AWS4{}", self.credentials.secret_access_key);
        let key = hmac(secret.as_bytes(), date_stamp)?;
        let key = hmac(&key, &self.credentials.region)?;
        let key = hmac(&key, "s3")?;
        let key = hmac(&key, "aws4_request")?;
        let signature = hex::encode(hmac(&key, &string_to_sign)?);

        Ok(format!("{query}&X-Amz-Signature={signature}"))
    }
}

#[async_trait]
impl UrlIssuerPort for S3Presigner {
    async fn issue(
        &self,
        verb: UrlVerb,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> AppResult<String> {
        let host = self.host();
        let path = canonical_path(&[bucket, key]);
        let expires = ttl.as_secs().clamp(1, MAX_EXPIRY_SECS);
        if expires != ttl.as_secs() {
            tracing::warn!(
                requested = ttl.as_secs(),
                expires,
                "presigned URL lifetime clamped"
            );
        }
        let query = Presign {
            method: verb.as_method(),
            host: &host,
            path: &path,
            credentials: &self.credentials,
            now: self.clock.now_utc(),
            expires,
        }
        .query()?;
        Ok(format!("{}{path}?{query}", self.origin()))
    }
}

/// Stands in when `[storage]` is empty; the refresher never calls it then.
#[derive(Clone, Default)]
pub struct StorageDisabled;

#[async_trait]
impl UrlIssuerPort for StorageDisabled {
    async fn issue(
        &self,
        _verb: UrlVerb,
        bucket: &str,
        key: &str,
        _ttl: Duration,
    ) -> AppResult<String> {
        Err(issuer_error(format!(
            "object storage is not configured, cannot sign {bucket}/{key}"
        )))
    }
}
