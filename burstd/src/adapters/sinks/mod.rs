// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Outbound sinks for finished jobs: accounting store, notifications, metrics.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::net::UnixDatagram;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::{AccountingPort, MetricsPort, Notification, NotificationPort};

fn http_client(timeout: Duration) -> AppResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| {
            AppError::with_message(
                AppErrorKind::Internal,
                codes::INTERNAL_ERROR,
                format!("failed to build HTTP client: {err}"),
            )
        })
}

fn sink_error(message: String) -> AppError {
    AppError::with_message(AppErrorKind::Unavailable, codes::SINK_FAILURE, message)
}

#[derive(Debug, Clone)]
pub struct AccountingConfig {
    pub url: String,
    pub index: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
}

/// Document store speaking the `PUT /<index>/_doc/<id>` upsert convention.
#[derive(Clone)]
pub struct HttpAccounting {
    http: reqwest::Client,
    config: AccountingConfig,
}

impl HttpAccounting {
    pub fn new(config: AccountingConfig) -> AppResult<Self> {
        Ok(Self {
            http: http_client(config.timeout)?,
            config,
        })
    }

    fn document_url(&self, job_id: i64) -> String {
        format!(
            "{}/{}/_doc/{job_id}",
            self.config.url.trim_end_matches('/'),
            self.config.index
        )
    }
}

#[async_trait]
impl AccountingPort for HttpAccounting {
    async fn upsert(&self, job_id: i64, record: &serde_json::Value) -> AppResult<()> {
        let mut request = self.http.put(self.document_url(job_id)).json(record);
        if let Some(user) = &self.config.username {
            request = request.basic_auth(user, self.config.password.as_deref());
        }
        let response = request
            .send()
            .await
            .map_err(|err| sink_error(format!("accounting request failed: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(sink_error(format!(
                "accounting store returned {status} for job {job_id}"
            )));
        }
        tracing::debug!(job_id, "accounting record upserted");
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    body: &'a str,
}

/// Hands notifications to a mail relay webhook.
#[derive(Clone)]
pub struct WebhookNotifier {
    http: reqwest::Client,
    url: String,
    sender: String,
}

impl WebhookNotifier {
    pub fn new(url: String, sender: String, timeout: Duration) -> AppResult<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            url,
            sender,
        })
    }
}

#[async_trait]
impl NotificationPort for WebhookNotifier {
    async fn notify(&self, notification: &Notification) {
        let message = WebhookMessage {
            from: &self.sender,
            to: &notification.recipient,
            subject: &notification.subject,
            body: &notification.body,
        };
        match self.http.post(&self.url).json(&message).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::info!(subject = %notification.subject, "notification sent");
            }
            Ok(response) => {
                tracing::warn!(
                    status = %response.status(),
                    subject = %notification.subject,
                    "notification webhook rejected message"
                );
            }
            Err(err) => {
                tracing::warn!(subject = %notification.subject, "notification failed: {err}");
            }
        }
    }
}

/// Used when no webhook is configured.
#[derive(Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationPort for LogNotifier {
    async fn notify(&self, notification: &Notification) {
        tracing::info!(
            subject = %notification.subject,
            "notification not delivered, no webhook configured"
        );
    }
}

/// Writes line protocol to a Telegraf unix datagram listener.
#[derive(Clone)]
pub struct TelegrafSocket {
    path: PathBuf,
}

impl TelegrafSocket {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl MetricsPort for TelegrafSocket {
    async fn emit(&self, line: &str) {
        let socket = match UnixDatagram::unbound() {
            Ok(socket) => socket,
            Err(err) => {
                tracing::warn!("unable to create metrics socket: {err}");
                return;
            }
        };
        if let Err(err) = socket.send_to(line.as_bytes(), &self.path).await {
            tracing::warn!(path = %self.path.display(), "unable to send metrics: {err}");
        }
    }
}

#[derive(Clone, Default)]
pub struct NoopMetrics;

#[async_trait]
impl MetricsPort for NoopMetrics {
    async fn emit(&self, _line: &str) {}
}
