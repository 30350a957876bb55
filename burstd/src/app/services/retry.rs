// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::future::Future;
use std::time::Duration;

use crate::app::ports::SleepPort;
use crate::app::types::DeleteOutcome;

/// Pause before 1-based attempt `attempt`: nothing before the first, then
/// `(attempt - 1) / 2` seconds.
pub fn delay_before(attempt: u32) -> Duration {
    if attempt <= 1 {
        return Duration::ZERO;
    }
    Duration::from_millis(u64::from(attempt - 1) * 500)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryReport {
    pub outcome: DeleteOutcome,
    pub attempts: u32,
}

/// Runs `op` until it reports `Deleted` or `max_attempts` is reached.
pub async fn retry_delete<F, Fut>(
    max_attempts: u32,
    sleeper: &dyn SleepPort,
    mut op: F,
) -> RetryReport
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = DeleteOutcome>,
{
    let max_attempts = max_attempts.max(1);
    let mut outcome = DeleteOutcome::Failed("not attempted".to_string());
    for attempt in 1..=max_attempts {
        let pause = delay_before(attempt);
        if !pause.is_zero() {
            sleeper.sleep(pause).await;
        }
        outcome = op(attempt).await;
        if outcome == DeleteOutcome::Deleted {
            return RetryReport { outcome, attempts: attempt };
        }
        tracing::debug!(attempt, max_attempts, ?outcome, "delete attempt did not succeed");
    }
    RetryReport {
        outcome,
        attempts: max_attempts,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    #[derive(Default)]
    struct RecordingSleeper {
        pauses: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl SleepPort for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.pauses.lock().unwrap().push(duration);
        }
    }

    #[test]
    fn delays_are_non_decreasing() {
        let delays: Vec<_> = (1..=6).map(delay_before).collect();
        assert_eq!(delays[0], Duration::ZERO);
        assert_eq!(delays[1], Duration::from_millis(500));
        assert_eq!(delays[3], Duration::from_millis(1500));
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn stops_at_first_success() {
        let sleeper = RecordingSleeper::default();
        let report = retry_delete(4, &sleeper, |attempt| async move {
            if attempt < 3 {
                DeleteOutcome::TimedOut
            } else {
                DeleteOutcome::Deleted
            }
        })
        .await;
        assert_eq!(report.outcome, DeleteOutcome::Deleted);
        assert_eq!(report.attempts, 3);
        assert_eq!(
            *sleeper.pauses.lock().unwrap(),
            vec![Duration::from_millis(500), Duration::from_secs(1)]
        );
    }

    #[tokio::test]
    async fn returns_last_outcome_after_exhausting_attempts() {
        let sleeper = RecordingSleeper::default();
        let calls = Mutex::new(0u32);
        let report = retry_delete(4, &sleeper, |attempt| {
            *calls.lock().unwrap() += 1;
            async move {
                if attempt == 4 {
                    DeleteOutcome::TimedOut
                } else {
                    DeleteOutcome::Failed("500".into())
                }
            }
        })
        .await;
        assert_eq!(*calls.lock().unwrap(), 4);
        assert_eq!(report.outcome, DeleteOutcome::TimedOut);
        assert_eq!(report.attempts, 4);
        assert_eq!(sleeper.pauses.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn zero_attempts_still_tries_once() {
        let sleeper = RecordingSleeper::default();
        let report = retry_delete(0, &sleeper, |_| async { DeleteOutcome::Deleted }).await;
        assert_eq!(report.attempts, 1);
    }
}
