//! Scheduler service
//!
//! The `Scheduler` is the public entry point: it owns a job set, validates
//! it, drives orchestration, and renders introspection reports. Generalized
//! from the teacher's `BuildDependencyGraphUseCase`/`AnalyzeJobsUseCase`
//! pair (`application/use_cases/{build_dependency_graph,analyze_jobs}.rs`),
//! which is where the teacher itself combines graph construction with a
//! driving use case over an owned job list.

use std::sync::{Arc, Mutex};

use crate::domain::entities::{Job, JobId};
use crate::error::GraphError;
use crate::presentation::introspection::JobView;

use super::services::graph_validator::GraphValidator;
use super::services::orchestrator::{self, OrchestrateOptions};

/// Options accepted by `Scheduler::new`, mirroring the source's
/// `Scheduler(*jobs, verbose=)`.
#[derive(Default)]
pub struct SchedulerOptions {
    verbose: bool,
}

impl SchedulerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

struct SchedulerInner {
    jobs: Mutex<Vec<Job>>,
    verbose: bool,
}

/// Owns a job set and drives it through validation and orchestration. Cheap
/// to clone; every clone shares the same underlying job set (so a `Job` or
/// `Sequence` built with `.scheduler(&s)` registers into the same instance a
/// caller holds).
#[derive(Clone)]
pub struct Scheduler(Arc<SchedulerInner>);

impl Scheduler {
    /// Creates a scheduler owning an initial job set.
    ///
    /// # Arguments
    ///
    /// * `jobs` - the initial job set; de-duplicated by identity
    /// * `opts` - scheduler-wide options (currently just `verbose`)
    ///
    /// # Returns
    ///
    /// A new scheduler ready for `rain_check`/`orchestrate`.
    pub fn new(jobs: impl IntoIterator<Item = Job>, opts: SchedulerOptions) -> Self {
        let mut seen = std::collections::HashSet::new();
        let jobs: Vec<Job> = jobs.into_iter().filter(|j| seen.insert(j.id())).collect();
        Scheduler(Arc::new(SchedulerInner { jobs: Mutex::new(jobs), verbose: opts.verbose }))
    }

    /// Adds a job to the set, ignoring it if already present (by identity).
    ///
    /// # Arguments
    ///
    /// * `job` - the job to add; a no-op if a job with the same identity is
    ///   already owned by this scheduler
    pub fn add(&self, job: Job) {
        let mut jobs = self.0.jobs.lock().unwrap();
        if !jobs.iter().any(|j| j.id() == job.id()) {
            jobs.push(job);
        }
    }

    /// Replaces the owned job set wholesale.
    ///
    /// # Arguments
    ///
    /// * `jobs` - the new job set; de-duplicated by identity, and entirely
    ///   replaces whatever this scheduler owned before the call
    pub fn update(&self, jobs: impl IntoIterator<Item = Job>) {
        let mut seen = std::collections::HashSet::new();
        *self.0.jobs.lock().unwrap() = jobs.into_iter().filter(|j| seen.insert(j.id())).collect();
    }

    fn snapshot(&self) -> Vec<Job> {
        self.0.jobs.lock().unwrap().clone()
    }

    /// Validates the owned job set without running anything: every
    /// prerequisite resolves inside the set, and the `required` graph is
    /// acyclic. Equivalent to the source's `Scheduler.rain_check()`.
    pub fn rain_check(&self) -> bool {
        GraphValidator::new().validate(&self.snapshot()).is_ok()
    }

    /// As `rain_check`, but returns the validator's error instead of
    /// collapsing it to a bool, for callers that want to report why.
    pub fn check_cycle(&self) -> Result<(), GraphError> {
        GraphValidator::new().validate(&self.snapshot())
    }

    /// The jobs left in the unresolved remainder of the most recent failed
    /// validation, so the introspection surface can render the offending
    /// cyclic subgraph (spec.md §4.3) instead of only a job count. Empty if
    /// the job set validates cleanly.
    pub fn cyclic_jobs(&self) -> Vec<JobView> {
        let jobs = self.snapshot();
        let mut validator = GraphValidator::new();
        if validator.validate(&jobs).is_ok() {
            return Vec::new();
        }
        let cyclic: std::collections::HashSet<JobId> = validator.last_cycle().iter().copied().collect();
        jobs.iter().filter(|j| cyclic.contains(&j.id())).map(JobView::of).collect()
    }

    /// Puts every owned job back to `Idle` with no outcome, so the same
    /// scheduler can be orchestrated again (SPEC_FULL.md §3).
    pub fn reset(&self) {
        for job in self.snapshot() {
            job.reset_runtime();
        }
    }

    /// Validates, then orchestrates the owned job set to completion. Returns
    /// `false` immediately (without running anything) if validation fails.
    pub async fn orchestrate(&self, opts: OrchestrateOptions) -> bool {
        let jobs = self.snapshot();
        if GraphValidator::new().validate(&jobs).is_err() {
            return false;
        }
        orchestrator::run(jobs, opts, self.0.verbose).await
    }

    pub fn jobs(&self) -> Vec<JobView> {
        self.snapshot().iter().map(JobView::of).collect()
    }

    /// One-line-per-job rendering, equivalent to the source's `Scheduler.list()`.
    pub fn list(&self) -> String {
        self.jobs().iter().map(JobView::line).collect::<Vec<_>>().join("\n")
    }

    /// Fuller rendering including results/exceptions when `details` is set,
    /// equivalent to the source's `Scheduler.debrief()`.
    pub fn debrief(&self, details: bool) -> String {
        let jobs = self.jobs();
        let done = jobs.iter().filter(|j| j.done).count();
        let mut out = format!("{}/{} jobs done\n", done, jobs.len());
        for view in &jobs {
            out.push_str(&view.line());
            out.push('\n');
            if details {
                out.push_str(&view.detail());
                out.push('\n');
            }
        }
        out
    }

    pub fn job_ids(&self) -> Vec<JobId> {
        self.snapshot().iter().map(Job::id).collect()
    }

    /// A machine-readable counterpart to [`Scheduler::debrief`], for hosts
    /// that want to persist or pipe the post-mortem report instead of
    /// printing it.
    pub fn debrief_json(&self) -> serde_json::Result<String> {
        crate::presentation::to_json(&self.jobs())
    }
}
