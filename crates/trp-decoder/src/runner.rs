//! Bounded execution of blocking import jobs
//!
//! Decoding is synchronous and has no cancellation point, so a timeout can only stop
//! *waiting* for a job. The concurrency slot is moved into the blocking closure and is
//! released when the job actually returns, never when the caller gives up on it.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// How a job submitted to the [`ImportRunner`] ended
#[derive(Debug)]
pub enum JobOutcome<T> {
    Finished(T),
    /// The job outlived its timeout; it keeps its slot until it returns
    TimedOut,
    /// The job panicked or the runner was shut down
    Aborted(String),
}

/// Runs blocking jobs with at most `max_concurrent` in flight and a per-job timeout
#[derive(Debug, Clone)]
pub struct ImportRunner {
    permits: Arc<Semaphore>,
    timeout: Duration,
    abandoned: Arc<AtomicUsize>,
}

impl ImportRunner {
    pub fn new(max_concurrent: usize, timeout: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            timeout,
            abandoned: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Slots not held by a running job, including timed-out jobs still running
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }

    /// Timed-out jobs that have not returned yet
    pub fn abandoned_jobs(&self) -> usize {
        self.abandoned.load(Ordering::SeqCst)
    }

    pub async fn run<F, T>(&self, job: F) -> JobOutcome<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => return JobOutcome::Aborted(e.to_string()),
        };

        let mut task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        });

        match tokio::time::timeout(self.timeout, &mut task).await {
            Ok(Ok(value)) => JobOutcome::Finished(value),
            Ok(Err(join_error)) => JobOutcome::Aborted(join_error.to_string()),
            Err(_) => {
                self.abandoned.fetch_add(1, Ordering::SeqCst);
                let abandoned = Arc::clone(&self.abandoned);
                tokio::spawn(async move {
                    if let Err(e) = task.await {
                        warn!("Timed-out import ended abnormally: {}", e);
                    }
                    abandoned.fetch_sub(1, Ordering::SeqCst);
                    debug!("Timed-out import returned and released its slot");
                });
                JobOutcome::TimedOut
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[tokio::test]
    async fn test_finished_job_returns_value_and_slot() {
        let runner = ImportRunner::new(2, Duration::from_secs(5));
        let outcome = runner.run(|| 21 * 2).await;
        assert!(matches!(outcome, JobOutcome::Finished(42)));
        assert_eq!(runner.available_slots(), 2);
        assert_eq!(runner.abandoned_jobs(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_timed_out_job_keeps_its_slot_until_it_returns() {
        let runner = ImportRunner::new(1, Duration::from_millis(20));
        let (release, gate) = mpsc::channel::<()>();

        let outcome = runner
            .run(move || {
                let _ = gate.recv_timeout(Duration::from_secs(10));
            })
            .await;
        assert!(matches!(outcome, JobOutcome::TimedOut));
        assert_eq!(runner.available_slots(), 0);
        assert_eq!(runner.abandoned_jobs(), 1);

        // A second job cannot start while the first is still decoding
        let blocked = tokio::time::timeout(Duration::from_millis(50), runner.run(|| ())).await;
        assert!(blocked.is_err());

        release.send(()).unwrap();
        let outcome = tokio::time::timeout(Duration::from_secs(5), runner.run(|| 7))
            .await
            .unwrap();
        assert!(matches!(outcome, JobOutcome::Finished(7)));

        for _ in 0..100 {
            if runner.abandoned_jobs() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(runner.abandoned_jobs(), 0);
        assert_eq!(runner.available_slots(), 1);
    }

    #[tokio::test]
    async fn test_panicking_job_is_aborted() {
        let runner = ImportRunner::new(1, Duration::from_secs(5));
        let outcome = runner.run(|| -> u8 { panic!("corrupt archive") }).await;
        assert!(matches!(outcome, JobOutcome::Aborted(_)));
        assert_eq!(runner.available_slots(), 1);
    }
}
