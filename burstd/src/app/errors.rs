// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::fmt;

pub mod codes {
    pub const INVALID_RECORD: &str = "invalid_record";
    pub const INVALID_ARGUMENT: &str = "invalid_argument";
    pub const NOT_FOUND: &str = "not_found";
    pub const DEPLOYMENT_FAILURE: &str = "deployment_failure";
    pub const DEPLOYMENT_TIMEOUT: &str = "deployment_timeout";
    pub const ISSUER_FAILURE: &str = "issuer_failure";
    pub const SCHEDULER_ERROR: &str = "scheduler_error";
    pub const STORAGE_ERROR: &str = "storage_error";
    pub const SINK_FAILURE: &str = "sink_failure";
    pub const INTERNAL_ERROR: &str = "internal_error";
    pub const LOCAL_ERROR: &str = "local_error";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppErrorKind {
    /// Malformed or incomplete job data; skip the job, keep going.
    InvalidData,
    InvalidArgument,
    NotFound,
    /// Failure talking to an external service that may succeed later.
    Unavailable,
    Timeout,
    Internal,
}

#[derive(Debug, Clone)]
pub struct AppError {
    kind: AppErrorKind,
    code: &'static str,
    message: String,
    context: Option<String>,
}

impl AppError {
    pub fn new(kind: AppErrorKind, code: &'static str) -> Self {
        Self {
            kind,
            code,
            message: code.to_string(),
            context: None,
        }
    }

    pub fn with_message(
        kind: AppErrorKind,
        code: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
            context: None,
        }
    }

    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::with_message(AppErrorKind::InvalidData, codes::INVALID_RECORD, message)
    }

    pub fn local(message: impl Into<String>) -> Self {
        Self::with_message(AppErrorKind::Internal, codes::LOCAL_ERROR, message)
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn kind(&self) -> AppErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == AppErrorKind::Timeout
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ctx) = &self.context {
            write!(f, "{} ({})", self.message, ctx)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context_when_present() {
        let err = AppError::invalid_record("missing Iwd").with_context("job 42");
        assert_eq!(err.to_string(), "missing Iwd (job 42)");
        assert_eq!(err.kind(), AppErrorKind::InvalidData);
        assert_eq!(err.code(), codes::INVALID_RECORD);
    }

    #[test]
    fn new_uses_code_as_message() {
        let err = AppError::new(AppErrorKind::Timeout, codes::DEPLOYMENT_TIMEOUT);
        assert_eq!(err.message(), "deployment_timeout");
        assert!(err.is_timeout());
        assert!(err.context().is_none());
    }
}
