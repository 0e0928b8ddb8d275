//! Job entity module
//!
//! A `Job` is a node in the dependency DAG: it owns its runtime state, its
//! completion outcome, the set of prerequisites it depends on, and an
//! opaque cancellable asynchronous body. Identity, not value, determines
//! equality: a `Job` is a cheaply-cloneable handle (`Arc`-backed), and two
//! clones of the same `Job` are the same DAG node.

use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::error::ConstructionError;

use super::body::{JobBody, JobFailure, JobOutput};
use super::requirement::{flatten_dedupe, IntoRequirement};

/// Stable, process-wide identity for a job. Generated once at construction;
/// never reused, never compared by pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct JobId(u64);

impl JobId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        JobId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Lifecycle state of a job. Progresses monotonically
/// `Idle -> Scheduled -> Running -> Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum JobState {
    Idle,
    Scheduled,
    Running,
    Done,
}

/// A job's completion outcome. Frozen once the job reaches `Done`
/// (invariant 4).
#[derive(Clone)]
pub enum Outcome {
    None,
    Ok(Arc<dyn std::any::Any + Send + Sync>),
    Err(Arc<dyn std::error::Error + Send + Sync>),
}

/// Options accepted by `Job::new`, mirroring the source's
/// `Job(body, required=, label=, critical=, forever=, scheduler=)` keyword
/// arguments as a builder.
pub struct JobOptions {
    pub(crate) required: Vec<Job>,
    pub(crate) label: Option<String>,
    pub(crate) critical: bool,
    pub(crate) forever: bool,
    pub(crate) scheduler: Option<crate::application::scheduler::Scheduler>,
}

impl JobOptions {
    pub fn new() -> Self {
        Self { required: Vec::new(), label: None, critical: false, forever: false, scheduler: None }
    }

    pub fn required(mut self, required: impl IntoRequirement) -> Self {
        self.required = flatten_dedupe(required);
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    pub fn forever(mut self, forever: bool) -> Self {
        self.forever = forever;
        self
    }

    pub fn scheduler(mut self, scheduler: &crate::application::scheduler::Scheduler) -> Self {
        self.scheduler = Some(scheduler.clone());
        self
    }
}

impl Default for JobOptions {
    fn default() -> Self {
        Self::new()
    }
}

struct JobInner {
    id: JobId,
    label: Option<String>,
    critical: bool,
    forever: bool,
    required: Mutex<HashSet<JobId>>,
    body: Box<dyn JobBody>,
    state: Mutex<JobState>,
    outcome: Mutex<Outcome>,
}

/// A node of the dependency DAG. Cheap to clone; every clone refers to the
/// same underlying job.
#[derive(Clone)]
pub struct Job(Arc<JobInner>);

impl Job {
    /// Creates a new `Idle` job. `opts.required` is already flattened and
    /// de-duplicated by `JobOptions::required`; self-requirement is
    /// impossible at construction time since the job does not exist yet to
    /// appear in its own `required` set (it can only be introduced later,
    /// via `requires`, where it is rejected).
    ///
    /// # Arguments
    ///
    /// * `body` - the opaque, cancellable asynchronous computation this job runs
    /// * `opts` - construction options: prerequisites, label, criticality, the
    ///   `forever` flag, and an optional scheduler to register into
    ///
    /// # Returns
    ///
    /// The new `Idle` job, or `Err` if `opts` itself was ill-formed.
    pub fn new(body: impl JobBody + 'static, opts: JobOptions) -> Result<Job, ConstructionError> {
        let id = JobId::next();
        let required = opts.required.iter().map(|j| j.id()).collect();
        let job = Job(Arc::new(JobInner {
            id,
            label: opts.label,
            critical: opts.critical,
            forever: opts.forever,
            required: Mutex::new(required),
            body: Box::new(body),
            state: Mutex::new(JobState::Idle),
            outcome: Mutex::new(Outcome::None),
        }));
        if let Some(scheduler) = &opts.scheduler {
            scheduler.add(job.clone());
        }
        Ok(job)
    }

    pub fn id(&self) -> JobId {
        self.0.id
    }

    pub fn label(&self) -> Option<&str> {
        self.0.label.as_deref()
    }

    pub fn critical(&self) -> bool {
        self.0.critical
    }

    pub fn forever(&self) -> bool {
        self.0.forever
    }

    /// Extends `required` with the flattened, de-duplicated leaves of
    /// `required`. Rejects self-requirement synchronously.
    ///
    /// # Arguments
    ///
    /// * `required` - nothing, a single `Job`/`Sequence`, or any nesting of
    ///   `Vec`/`HashSet`/arrays/`Option` of the above; flattened and
    ///   de-duplicated by identity before being unioned in
    ///
    /// # Returns
    ///
    /// `Ok(())` once `required` is unioned in, or
    /// `Err(ConstructionError::SelfRequirement)` if `required` resolves to
    /// include this job itself, however deeply nested.
    pub fn requires(&self, required: impl IntoRequirement) -> Result<(), ConstructionError> {
        let flat = flatten_dedupe(required);
        if flat.iter().any(|j| j.id() == self.id()) {
            return Err(ConstructionError::SelfRequirement);
        }
        let mut guard = self.0.required.lock().unwrap();
        guard.extend(flat.iter().map(Job::id));
        Ok(())
    }

    pub fn required(&self) -> HashSet<JobId> {
        self.0.required.lock().unwrap().clone()
    }

    pub fn state(&self) -> JobState {
        *self.0.state.lock().unwrap()
    }

    pub fn is_done(&self) -> bool {
        self.state() == JobState::Done
    }

    pub fn result(&self) -> Option<Arc<dyn std::any::Any + Send + Sync>> {
        match &*self.0.outcome.lock().unwrap() {
            Outcome::Ok(v) => Some(v.clone()),
            _ => None,
        }
    }

    /// Convenience over `result()` for a known concrete output type.
    pub fn downcast_result<T: 'static + Send + Sync>(&self) -> Option<Arc<T>> {
        self.result().and_then(|r| r.downcast::<T>().ok())
    }

    pub fn raised_exception(&self) -> Option<Arc<dyn std::error::Error + Send + Sync>> {
        match &*self.0.outcome.lock().unwrap() {
            Outcome::Err(e) => Some(e.clone()),
            _ => None,
        }
    }

    pub(crate) fn set_state(&self, state: JobState) {
        *self.0.state.lock().unwrap() = state;
    }

    pub(crate) async fn run_body(&self, cancel: CancellationToken) -> Result<JobOutput, JobFailure> {
        self.0.body.co_run(cancel).await
    }

    pub(crate) async fn shutdown(&self) {
        self.0.body.co_shutdown().await;
    }

    /// Freezes the job's outcome and advances it to `Done`.
    pub(crate) fn complete(&self, outcome: Result<JobOutput, JobFailure>) {
        *self.0.state.lock().unwrap() = JobState::Done;
        *self.0.outcome.lock().unwrap() = match outcome {
            Ok(v) => Outcome::Ok(Arc::from(v)),
            Err(e) => Outcome::Err(Arc::from(e)),
        };
    }

    /// Puts the job back to `Idle` with no outcome, so the owning
    /// scheduler can be reused for a second orchestration.
    pub(crate) fn reset_runtime(&self) {
        *self.0.state.lock().unwrap() = JobState::Idle;
        *self.0.outcome.lock().unwrap() = Outcome::None;
    }
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Job {}

impl Hash for Job {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id())
            .field("label", &self.label())
            .field("state", &self.state())
            .finish()
    }
}
