//! Job body module
//!
//! `JobBody` is the opaque, cancellable asynchronous computation a `Job`
//! wraps. The source relied on an ambient `asyncio` event loop and bare
//! coroutines; here the contract is made explicit: a body is handed a
//! `CancellationToken` and is expected to check or select against it at its
//! own suspension points.

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// The value a successful job body produces. Opaque to the scheduler; the
/// caller downcasts it via `Job::result`.
pub type JobOutput = Box<dyn Any + Send + Sync>;

/// The error a failed job body raises. Opaque to the scheduler; the caller
/// inspects it via `Job::raised_exception`.
pub type JobFailure = Box<dyn std::error::Error + Send + Sync>;

pub(crate) type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// The asynchronous, cancellable computation a job performs.
///
/// Implementors must treat `cancel` cooperatively: check `cancel.is_cancelled()`
/// or race it in a `tokio::select!` at suspension points. The scheduler never
/// forcibly tears down a body on the happy path; it only cancels the token
/// and waits out a bounded grace period.
#[async_trait]
pub trait JobBody: Send + Sync {
    /// Runs the job to completion or until `cancel` fires.
    async fn co_run(&self, cancel: CancellationToken) -> Result<JobOutput, JobFailure>;

    /// Cleanup hook, invoked exactly once by the scheduler on orchestration
    /// termination regardless of how (or whether) the job ran. Must be
    /// idempotent: a caller invoking it more than once must observe the
    /// same effect as invoking it once.
    async fn co_shutdown(&self) {}
}

/// Plain body-wrapper: adapts a one-shot async closure into a `JobBody`,
/// the equivalent of the source's bare `Job(coroutine)` form.
pub struct FnJob {
    label: Option<String>,
    f: Mutex<Option<Box<dyn FnOnce(CancellationToken) -> BoxFuture<Result<JobOutput, JobFailure>> + Send>>>,
}

impl FnJob {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<JobOutput, JobFailure>> + Send + 'static,
    {
        Self {
            label: None,
            f: Mutex::new(Some(Box::new(move |tok| Box::pin(f(tok)) as BoxFuture<_>))),
        }
    }

    pub fn labeled<F, Fut>(label: impl Into<String>, f: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<JobOutput, JobFailure>> + Send + 'static,
    {
        let mut job = Self::new(f);
        job.label = Some(label.into());
        job
    }
}

#[async_trait]
impl JobBody for FnJob {
    async fn co_run(&self, cancel: CancellationToken) -> Result<JobOutput, JobFailure> {
        let f = self
            .f
            .lock()
            .unwrap()
            .take()
            .expect("FnJob body invoked more than once (a job runs at most once)");
        f(cancel).await
    }
}

/// A `forever` helper that logs on a fixed interval until cancelled,
/// equivalent to the source's `TickJob`/`PrintJob`.
pub struct TickJob {
    label: String,
    interval: std::time::Duration,
}

impl TickJob {
    pub fn new(label: impl Into<String>, interval: std::time::Duration) -> Self {
        Self { label: label.into(), interval }
    }
}

#[async_trait]
impl JobBody for TickJob {
    async fn co_run(&self, cancel: CancellationToken) -> Result<JobOutput, JobFailure> {
        let mut ticks: u64 = 0;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {
                    ticks += 1;
                    tracing::debug!(label = %self.label, ticks, "tick");
                }
            }
        }
        Ok(Box::new(ticks))
    }

    async fn co_shutdown(&self) {
        tracing::debug!(label = %self.label, "forever job shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fn_job_runs_once() {
        let job = FnJob::new(|_| async { Ok(Box::new(42_i64) as JobOutput) });
        let out = job.co_run(CancellationToken::new()).await.unwrap();
        assert_eq!(*out.downcast::<i64>().unwrap(), 42);
    }

    #[tokio::test]
    #[should_panic(expected = "invoked more than once")]
    async fn fn_job_panics_on_second_run() {
        let job = FnJob::new(|_| async { Ok(Box::new(()) as JobOutput) });
        let _ = job.co_run(CancellationToken::new()).await;
        let _ = job.co_run(CancellationToken::new()).await;
    }

    #[tokio::test(start_paused = true)]
    async fn tick_job_stops_on_cancel() {
        let job = TickJob::new("t", std::time::Duration::from_millis(100));
        let token = CancellationToken::new();
        let token2 = token.clone();
        let handle = tokio::spawn(async move { job.co_run(token2).await });
        tokio::time::advance(std::time::Duration::from_millis(350)).await;
        token.cancel();
        let out = handle.await.unwrap().unwrap();
        let ticks = *out.downcast::<u64>().unwrap();
        assert!(ticks >= 3);
    }
}
