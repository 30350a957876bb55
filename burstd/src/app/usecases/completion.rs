// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::app::errors::{AppError, AppResult};
use crate::app::ports::{
    AccountingPort, JobRecordStorePort, LedgerPort, LocalFilesystemPort, MetricsPort,
    Notification, NotificationPort,
};
use crate::app::services::classad::{AdValue, ClassAd};
use crate::app::services::job_ad::{self, RECORD_ATTRIBUTES, attr};
use crate::app::services::stats::{self, ExecutionStats};
use crate::app::services::accounting_record;
use crate::app::types::{JobKind, JobRecord, JobStatus, LedgerState, RecordSource};
use crate::app::usecases::{execution_stats_path, job_description_path};

const HISTORY_PREFIX: &str = "history.";

#[derive(Debug, Clone)]
pub struct CompletionSettings {
    /// Only queue records that entered Completed within this window are considered.
    pub queue_window: Duration,
    pub history_dir: Option<PathBuf>,
    pub processed_dir: PathBuf,
    pub history_limit: usize,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            queue_window: Duration::from_secs(120),
            history_dir: None,
            processed_dir: PathBuf::from("processed"),
            history_limit: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No job-type marker; not submitted through the burst front end.
    NotManaged,
    RoutedCopy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Processed,
    AlreadyProcessed,
    /// Another discovery path holds the claim.
    InFlight,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub processed: usize,
    pub already_processed: usize,
    pub in_flight: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl PassSummary {
    fn record(&mut self, outcome: &AppResult<ProcessOutcome>) {
        match outcome {
            Ok(ProcessOutcome::Processed) => self.processed += 1,
            Ok(ProcessOutcome::AlreadyProcessed) => self.already_processed += 1,
            Ok(ProcessOutcome::InFlight) => self.in_flight += 1,
            Ok(ProcessOutcome::Skipped(_)) => self.skipped += 1,
            Err(_) => self.failed += 1,
        }
    }
}

#[derive(Clone)]
pub struct CompletionProcessor {
    scheduler: Arc<dyn JobRecordStorePort>,
    ledger: Arc<dyn LedgerPort>,
    accounting: Arc<dyn AccountingPort>,
    notifier: Arc<dyn NotificationPort>,
    metrics: Arc<dyn MetricsPort>,
    fs: Arc<dyn LocalFilesystemPort>,
    settings: CompletionSettings,
}

impl CompletionProcessor {
    pub fn new(
        scheduler: Arc<dyn JobRecordStorePort>,
        ledger: Arc<dyn LedgerPort>,
        accounting: Arc<dyn AccountingPort>,
        notifier: Arc<dyn NotificationPort>,
        metrics: Arc<dyn MetricsPort>,
        fs: Arc<dyn LocalFilesystemPort>,
        settings: CompletionSettings,
    ) -> Self {
        Self {
            scheduler,
            ledger,
            accounting,
            notifier,
            metrics,
            fs,
            settings,
        }
    }

    /// Dispatch the side effects of one finished job at most once.
    ///
    /// The ledger claim is taken before anything is sent and only becomes
    /// `processed` after accounting succeeded, so a record reachable from both
    /// the queue and the history is handled by whichever path claims it first.
    pub async fn process(
        &self,
        record: &JobRecord,
        source: &RecordSource,
    ) -> AppResult<ProcessOutcome> {
        let job_id = record.job_id;

        if self.ledger.state(job_id).await? == LedgerState::Processed {
            tracing::debug!(job_id, source = source.as_str(), "job already processed");
            self.archive(source, job_id).await;
            return Ok(ProcessOutcome::AlreadyProcessed);
        }

        if let Some(reason) = skip_reason(record) {
            tracing::debug!(job_id, ?reason, "not a managed job, skipping");
            self.archive(source, job_id).await;
            return Ok(ProcessOutcome::Skipped(reason));
        }

        if !self.ledger.try_claim(job_id).await? {
            tracing::debug!(job_id, source = source.as_str(), "job claimed elsewhere");
            return Ok(ProcessOutcome::InFlight);
        }

        let description = self.read_description(record).await;
        let stats = self.read_stats(record).await;

        let document = accounting_record::build(description.clone(), record, stats.as_ref());
        if let Err(err) = self.accounting.upsert(job_id, &document).await {
            if let Err(release_err) = self.ledger.release_claim(job_id).await {
                tracing::error!(job_id, "unable to release ledger claim: {release_err}");
            }
            return Err(err.with_context(format!("accounting for job {job_id}")));
        }
        tracing::info!(job_id, source = source.as_str(), "accounting record stored");

        let stats = stats.unwrap_or_default();
        if let Some(notification) = finished_notification(record, &description, &stats) {
            self.notifier.notify(&notification).await;
        }

        let owner = record.owner.as_deref().unwrap_or("unknown");
        self.metrics
            .emit(&stats::metrics_line(owner, record.site(), job_id, &stats))
            .await;

        self.ledger.mark_processed(job_id).await?;
        self.archive(source, job_id).await;
        Ok(ProcessOutcome::Processed)
    }

    /// Recently completed jobs still in the live queue.
    pub async fn process_queue(&self) -> AppResult<PassSummary> {
        let constraint = format!(
            "JobStatus == 4 && CurrentTime - EnteredCurrentStatus < {} && isUndefined({}) && {} =!= true",
            self.settings.queue_window.as_secs(),
            attr::ROUTED_BY,
            attr::PROCESSED,
        );
        let ads = self.scheduler.query_live(&constraint, RECORD_ATTRIBUTES).await?;

        let mut summary = PassSummary::default();
        for ad in &ads {
            let outcome = self.process_ad(ad, &RecordSource::Queue).await;
            if matches!(
                outcome,
                Ok(ProcessOutcome::Processed | ProcessOutcome::AlreadyProcessed)
            ) {
                self.mark_in_queue(ad).await;
            }
            summary.record(&outcome);
        }
        tracing::info!(
            processed = summary.processed,
            in_flight = summary.in_flight,
            failed = summary.failed,
            "queue pass finished"
        );
        Ok(summary)
    }

    /// Records the scheduler has moved out of the queue.
    pub async fn process_history(&self) -> AppResult<PassSummary> {
        let summary = match &self.settings.history_dir {
            Some(dir) => self.process_history_dir(dir).await?,
            None => self.process_history_query().await?,
        };
        tracing::info!(
            processed = summary.processed,
            in_flight = summary.in_flight,
            failed = summary.failed,
            "history pass finished"
        );
        Ok(summary)
    }

    async fn process_history_dir(&self, dir: &Path) -> AppResult<PassSummary> {
        let archive = &self.settings.processed_dir;
        self.fs.create_dir_all(archive).await.map_err(|err| {
            err.with_context(format!("preparing archive {}", archive.display()))
        })?;

        let mut summary = PassSummary::default();
        for path in self.fs.list_dir(dir).await? {
            let is_history = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(HISTORY_PREFIX));
            if !is_history {
                continue;
            }

            let outcome = match self.load_history_file(&path).await {
                Ok(ad) => {
                    self.process_ad(&ad, &RecordSource::HistoryFile(path.clone()))
                        .await
                }
                Err(err) => {
                    tracing::warn!(path = %path.display(), "leaving unreadable history file: {err}");
                    Err(err)
                }
            };
            summary.record(&outcome);
        }
        Ok(summary)
    }

    async fn process_history_query(&self) -> AppResult<PassSummary> {
        let constraint = format!("JobStatus == 4 && isUndefined({})", attr::ROUTED_BY);
        let ads = self
            .scheduler
            .query_history(&constraint, RECORD_ATTRIBUTES, self.settings.history_limit)
            .await?;
        let mut summary = PassSummary::default();
        for ad in &ads {
            summary.record(&self.process_ad(ad, &RecordSource::History).await);
        }
        Ok(summary)
    }

    async fn load_history_file(&self, path: &Path) -> AppResult<ClassAd> {
        let text = self.fs.read_to_string(path).await?;
        ClassAd::parse(&text).map_err(|err| {
            AppError::invalid_record(err.to_string()).with_context(path.display().to_string())
        })
    }

    async fn process_ad(&self, ad: &ClassAd, source: &RecordSource) -> AppResult<ProcessOutcome> {
        let outcome = match job_ad::decode(ad) {
            Ok(record) => self.process(&record, source).await,
            Err(err) => Err(err),
        };
        if let Err(err) = &outcome {
            tracing::error!(source = source.as_str(), "unable to process completed job: {err}");
        }
        outcome
    }

    async fn mark_in_queue(&self, ad: &ClassAd) {
        let Some(job_id) = ad.get_i64(attr::CLUSTER_ID) else {
            return;
        };
        let constraint = job_ad::job_constraint(job_id);
        if let Err(err) = self
            .scheduler
            .mutate(&constraint, attr::PROCESSED, &AdValue::Bool(true))
            .await
        {
            tracing::warn!(job_id, "unable to flag job as processed in the queue: {err}");
        }
    }

    async fn archive(&self, source: &RecordSource, job_id: i64) {
        let RecordSource::HistoryFile(path) = source else {
            return;
        };
        let Some(name) = path.file_name() else {
            return;
        };
        let target = self.settings.processed_dir.join(name);
        if let Err(err) = self.fs.rename(path, &target).await {
            tracing::warn!(
                job_id,
                path = %path.display(),
                "unable to archive history file: {err}"
            );
        }
    }

    async fn read_description(&self, record: &JobRecord) -> Value {
        let path = job_description_path(&record.working_directory);
        let parsed = match self.fs.read_to_string(&path).await {
            Ok(text) => serde_json::from_str::<Value>(&text).map_err(|err| err.to_string()),
            Err(err) => Err(err.to_string()),
        };
        parsed.unwrap_or_else(|err| {
            tracing::warn!(
                job_id = record.job_id,
                path = %path.display(),
                "job description unavailable: {err}"
            );
            Value::Object(Default::default())
        })
    }

    async fn read_stats(&self, record: &JobRecord) -> Option<ExecutionStats> {
        let path = execution_stats_path(&record.working_directory, record.factory_id);
        let text = self.fs.read_to_string(&path).await.ok()?;
        match serde_json::from_str::<Value>(&text) {
            Ok(doc) => Some(ExecutionStats::from_json(&doc)),
            Err(err) => {
                tracing::warn!(
                    job_id = record.job_id,
                    path = %path.display(),
                    "malformed execution statistics: {err}"
                );
                None
            }
        }
    }
}

fn skip_reason(record: &JobRecord) -> Option<SkipReason> {
    if record.kind() == JobKind::RoutedCopy {
        return Some(SkipReason::RoutedCopy);
    }
    if record.job_type.is_none() {
        return Some(SkipReason::NotManaged);
    }
    None
}

fn wants_email(description: &Value) -> bool {
    description
        .get("notifications")
        .and_then(Value::as_array)
        .is_some_and(|entries| {
            entries.iter().any(|entry| {
                entry.get("event").and_then(Value::as_str) == Some("jobFinished")
                    && entry.get("type").and_then(Value::as_str) == Some("email")
            })
        })
}

fn finished_notification(
    record: &JobRecord,
    description: &Value,
    stats: &ExecutionStats,
) -> Option<Notification> {
    if record.status != JobStatus::Completed || !wants_email(description) {
        return None;
    }
    let recipient = record.email.clone()?;
    Some(Notification {
        recipient,
        subject: stats::notification_subject(record.job_id, record.name.as_deref()),
        body: stats::notification_body(stats, record.site()),
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::app::errors::codes;
    use crate::app::usecases::fakes::{
        FakeScheduler, MemoryFs, MemoryLedger, RecordingAccounting, RecordingMetrics,
        RecordingNotifier,
    };

    const IWD: &str = "/sandbox/job42";
    const SPOOL: &str = "/spool/history";
    const DONE: &str = "/spool/processed";

    const DESCRIPTION: &str = r#"{
        "name": "render",
        "inputs": [{"filename": "in.txt", "content": "c2VjcmV0"}],
        "notifications": [{"event": "jobFinished", "type": "email"}]
    }"#;

    const PROMLET: &str = r#"{"tasks": [
        {"cpuTimeUsage": 3600, "wallTimeUsage": 3700},
        {"cpuTimeUsage": 60, "wallTimeUsage": 100},
        {"maxMemoryUsageKB": 2048000}
    ]}"#;

    fn ad_text(job_id: i64, extra: &str) -> String {
        format!(
            "ClusterId = {job_id}\nProcId = 0\nJobStatus = 4\nIwd = \"{IWD}\"\n\
             BurstType = \"job\"\nBurstIdentity = \"alice\"\nBurstGroup = \"physics,cms\"\n\
             BurstEmail = \"alice@example.org\"\nBurstName = \"render\"\n\
             BurstJobUniqueIdentifier = \"4f1c\"\nBurstFactoryId = 0\nQDate = 1699990000\n\
             BurstInfrastructureSite = \"site-a\"\nBurstInfrastructureId = \"infra-9\"\n\
             BurstInfrastructureType = \"cloud\"\n{extra}"
        )
    }

    fn ad(job_id: i64) -> ClassAd {
        ClassAd::parse(&ad_text(job_id, "")).unwrap()
    }

    struct Harness {
        scheduler: Arc<FakeScheduler>,
        ledger: Arc<MemoryLedger>,
        accounting: Arc<RecordingAccounting>,
        notifier: Arc<RecordingNotifier>,
        metrics: Arc<RecordingMetrics>,
        fs: Arc<MemoryFs>,
        processor: CompletionProcessor,
    }

    fn harness(scheduler: FakeScheduler, fs: MemoryFs, history_dir: Option<&str>) -> Harness {
        let scheduler = Arc::new(scheduler);
        let ledger = Arc::new(MemoryLedger::default());
        let accounting = Arc::new(RecordingAccounting::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let metrics = Arc::new(RecordingMetrics::default());
        let fs = Arc::new(
            fs.with_file(format!("{IWD}/.job.json"), DESCRIPTION)
                .with_file(format!("{IWD}/promlet.0.json"), PROMLET),
        );
        let settings = CompletionSettings {
            history_dir: history_dir.map(PathBuf::from),
            processed_dir: PathBuf::from(DONE),
            ..CompletionSettings::default()
        };
        let processor = CompletionProcessor::new(
            scheduler.clone(),
            ledger.clone(),
            accounting.clone(),
            notifier.clone(),
            metrics.clone(),
            fs.clone(),
            settings,
        );
        Harness {
            scheduler,
            ledger,
            accounting,
            notifier,
            metrics,
            fs,
            processor,
        }
    }

    #[tokio::test]
    async fn completed_job_dispatches_everything_once() {
        let h = harness(FakeScheduler::default(), MemoryFs::default(), None);
        let record = job_ad::decode(&ad(42)).unwrap();

        let outcome = h.processor.process(&record, &RecordSource::Queue).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Processed);
        assert_eq!(h.ledger.get(42), LedgerState::Processed);

        let records = h.accounting.records.lock().unwrap().clone();
        assert_eq!(records.len(), 1);
        let (job_id, doc) = &records[0];
        assert_eq!(*job_id, 42);
        assert_eq!(doc["inputs"][0]["content"], "");
        assert_eq!(doc["execution"]["site"], "site-a");
        assert_eq!(doc["execution"]["maxMemoryUsageKB"], 2048000);
        assert_eq!(doc["group"], "physics,cms");
        assert_eq!(doc["scheduler"]["JobStatus"], 4);

        let sent = h.notifier.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, "alice@example.org");
        assert_eq!(sent[0].subject, "Your job with id 42 (render) has finished");
        assert!(sent[0].body.contains("0+01:01:00"));
        assert!(sent[0].body.contains("2048 MB"));

        let lines = h.metrics.lines.lock().unwrap().clone();
        assert_eq!(
            lines,
            vec!["accounting,identity=alice,infra_site=site-a job_id=42,walltime=3800,cputime=3660\n"]
        );

        let again = h.processor.process(&record, &RecordSource::Queue).await.unwrap();
        assert_eq!(again, ProcessOutcome::AlreadyProcessed);
        assert_eq!(h.accounting.count(), 1);
        assert_eq!(h.notifier.count(), 1);
        assert_eq!(h.metrics.count(), 1);
    }

    #[tokio::test]
    async fn claimed_job_is_in_flight_and_untouched() {
        let h = harness(FakeScheduler::default(), MemoryFs::default(), None);
        h.ledger.entries.lock().unwrap().insert(42, LedgerState::Claimed);
        let record = job_ad::decode(&ad(42)).unwrap();

        let outcome = h.processor.process(&record, &RecordSource::History).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::InFlight);
        assert_eq!(h.accounting.count(), 0);
        assert_eq!(h.metrics.count(), 0);
    }

    #[tokio::test]
    async fn accounting_failure_releases_claim_and_sends_nothing() {
        let h = harness(FakeScheduler::default(), MemoryFs::default(), None);
        *h.accounting.fail.lock().unwrap() = true;
        let record = job_ad::decode(&ad(42)).unwrap();

        let err = h
            .processor
            .process(&record, &RecordSource::Queue)
            .await
            .unwrap_err();
        assert_eq!(err.code(), codes::SINK_FAILURE);
        assert_eq!(h.ledger.get(42), LedgerState::Unknown);
        assert_eq!(h.notifier.count(), 0);
        assert_eq!(h.metrics.count(), 0);

        *h.accounting.fail.lock().unwrap() = false;
        let retried = h.processor.process(&record, &RecordSource::Queue).await.unwrap();
        assert_eq!(retried, ProcessOutcome::Processed);
        assert_eq!(h.accounting.count(), 1);
    }

    #[tokio::test]
    async fn unmanaged_and_routed_records_are_skipped_without_marking() {
        let h = harness(FakeScheduler::default(), MemoryFs::default(), None);

        let mut plain = ad(7);
        plain.set(attr::TYPE, AdValue::Undefined);
        let plain = job_ad::decode(&plain).unwrap();
        assert_eq!(
            h.processor.process(&plain, &RecordSource::Queue).await.unwrap(),
            ProcessOutcome::Skipped(SkipReason::NotManaged)
        );

        let routed =
            job_ad::decode(&ClassAd::parse(&ad_text(8, "RoutedBy = \"jobrouter\"\n")).unwrap())
                .unwrap();
        assert_eq!(
            h.processor.process(&routed, &RecordSource::Queue).await.unwrap(),
            ProcessOutcome::Skipped(SkipReason::RoutedCopy)
        );

        assert_eq!(h.ledger.get(7), LedgerState::Unknown);
        assert_eq!(h.ledger.get(8), LedgerState::Unknown);
        assert_eq!(h.accounting.count(), 0);
    }

    #[tokio::test]
    async fn no_email_without_opt_in_or_for_removed_jobs() {
        let fs = MemoryFs::default();
        let h = harness(FakeScheduler::default(), fs, None);
        h.fs.files
            .lock()
            .unwrap()
            .insert(PathBuf::from(format!("{IWD}/.job.json")), "{}".to_string());
        let record = job_ad::decode(&ad(42)).unwrap();
        h.processor.process(&record, &RecordSource::Queue).await.unwrap();
        assert_eq!(h.notifier.count(), 0);

        let h = harness(FakeScheduler::default(), MemoryFs::default(), None);
        let removed =
            job_ad::decode(&ClassAd::parse(&ad_text(43, "").replace("JobStatus = 4", "JobStatus = 3")).unwrap())
                .unwrap();
        h.processor.process(&removed, &RecordSource::Queue).await.unwrap();
        assert_eq!(h.notifier.count(), 0);
        assert_eq!(h.accounting.count(), 1);
    }

    #[tokio::test]
    async fn missing_description_and_stats_still_account() {
        let h = harness(FakeScheduler::default(), MemoryFs::default(), None);
        let record = job_ad::decode(&ClassAd::parse(
            &ad_text(42, "").replace(IWD, "/sandbox/empty"),
        ).unwrap())
        .unwrap();

        let outcome = h.processor.process(&record, &RecordSource::Queue).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Processed);
        let lines = h.metrics.lines.lock().unwrap().clone();
        assert!(lines[0].ends_with("walltime=0,cputime=0\n"));
    }

    #[tokio::test]
    async fn queue_and_history_see_job_42_and_dispatch_once() {
        let scheduler = FakeScheduler::with_live(vec![ad(42)]);
        let fs = MemoryFs::default().with_file(format!("{SPOOL}/history.42.0"), &ad_text(42, ""));
        let h = harness(scheduler, fs, Some(SPOOL));

        let queue = h.processor.process_queue().await.unwrap();
        let history = h.processor.process_history().await.unwrap();

        assert_eq!(queue.processed, 1);
        assert_eq!(history.already_processed, 1);
        assert_eq!(h.accounting.count(), 1);
        assert_eq!(h.notifier.count(), 1);
        assert_eq!(h.metrics.count(), 1);
        assert!(h.fs.read(format!("{DONE}/history.42.0")).is_some());
        assert!(h.fs.read(format!("{SPOOL}/history.42.0")).is_none());

        let mutations = h.scheduler.mutations.lock().unwrap().clone();
        assert_eq!(
            mutations,
            vec![("ClusterId == 42".to_string(), attr::PROCESSED.to_string(), AdValue::Bool(true))]
        );
    }

    #[tokio::test]
    async fn concurrent_passes_dispatch_once() {
        let scheduler = FakeScheduler::with_live(vec![ad(42)]);
        let fs = MemoryFs::default().with_file(format!("{SPOOL}/history.42.0"), &ad_text(42, ""));
        let h = harness(scheduler, fs, Some(SPOOL));

        let (queue, history) =
            tokio::join!(h.processor.process_queue(), h.processor.process_history());
        let queue = queue.unwrap();
        let history = history.unwrap();

        assert_eq!(queue.processed + history.processed, 1);
        assert_eq!(h.accounting.count(), 1);
        assert_eq!(h.notifier.count(), 1);
    }

    #[tokio::test]
    async fn queue_constraint_excludes_routed_and_flagged_jobs() {
        let h = harness(FakeScheduler::default(), MemoryFs::default(), None);
        h.processor.process_queue().await.unwrap();
        let queries = h.scheduler.live_queries.lock().unwrap().clone();
        assert_eq!(
            queries,
            vec![
                "JobStatus == 4 && CurrentTime - EnteredCurrentStatus < 120 && isUndefined(RoutedBy) && BurstProcessed =!= true"
                    .to_string()
            ]
        );
    }

    #[tokio::test]
    async fn malformed_history_file_is_left_in_place() {
        let fs = MemoryFs::default()
            .with_file(format!("{SPOOL}/history.1.0"), "this is not an ad\n")
            .with_file(format!("{SPOOL}/history.42.0"), &ad_text(42, ""))
            .with_file(format!("{SPOOL}/README"), "ignored");
        let h = harness(FakeScheduler::default(), fs, Some(SPOOL));

        let summary = h.processor.process_history().await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.skipped + summary.in_flight, 0);
        assert!(h.fs.read(format!("{SPOOL}/history.1.0")).is_some());
        assert!(h.fs.read(format!("{SPOOL}/README")).is_some());
    }

    #[tokio::test]
    async fn skipped_history_files_are_archived() {
        let fs = MemoryFs::default().with_file(
            format!("{SPOOL}/history.8.0"),
            &ad_text(8, "RoutedBy = \"jobrouter\"\n"),
        );
        let h = harness(FakeScheduler::default(), fs, Some(SPOOL));
        let summary = h.processor.process_history().await.unwrap();
        assert_eq!(summary.skipped, 1);
        assert!(h.fs.read(format!("{DONE}/history.8.0")).is_some());
    }

    #[tokio::test]
    async fn history_files_are_archived_into_a_fresh_processed_dir() {
        use crate::adapters::fs::LocalFilesystem;

        let root = tempfile::tempdir().unwrap();
        let spool = root.path().join("history");
        let processed = spool.join("processed");
        std::fs::create_dir(&spool).unwrap();
        std::fs::write(spool.join("history.42.0"), ad_text(42, "")).unwrap();

        let accounting = Arc::new(RecordingAccounting::default());
        let processor = CompletionProcessor::new(
            Arc::new(FakeScheduler::default()),
            Arc::new(MemoryLedger::default()),
            accounting.clone(),
            Arc::new(RecordingNotifier::default()),
            Arc::new(RecordingMetrics::default()),
            Arc::new(LocalFilesystem::new()),
            CompletionSettings {
                history_dir: Some(spool.clone()),
                processed_dir: processed.clone(),
                ..CompletionSettings::default()
            },
        );

        let first = processor.process_history().await.unwrap();
        assert_eq!(first.processed, 1);
        assert!(!spool.join("history.42.0").exists());
        assert!(processed.join("history.42.0").is_file());

        let second = processor.process_history().await.unwrap();
        assert_eq!(second, PassSummary::default());
        assert_eq!(accounting.count(), 1);
    }

    #[tokio::test]
    async fn history_pass_prepares_archive_dir() {
        let h = harness(FakeScheduler::default(), MemoryFs::default(), Some(SPOOL));
        h.processor.process_history().await.unwrap();
        assert!(h.fs.dirs.lock().unwrap().contains(&PathBuf::from(DONE)));
    }

    #[tokio::test]
    async fn history_query_used_without_spool_directory() {
        let h = harness(FakeScheduler::with_history(vec![ad(42)]), MemoryFs::default(), None);
        let summary = h.processor.process_history().await.unwrap();
        assert_eq!(summary.processed, 1);
        let queries = h.scheduler.history_queries.lock().unwrap().clone();
        assert_eq!(
            queries,
            vec![("JobStatus == 4 && isUndefined(RoutedBy)".to_string(), 500)]
        );
        assert!(h.scheduler.mutations.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn one_bad_record_does_not_abort_the_pass() {
        let mut broken = ad(5);
        broken.set(attr::IWD, AdValue::Undefined);
        let scheduler = FakeScheduler::with_live(vec![broken, ad(42)]);
        let h = harness(scheduler, MemoryFs::default(), None);
        let summary = h.processor.process_queue().await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.processed, 1);
    }
}
