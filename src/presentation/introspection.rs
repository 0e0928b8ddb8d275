//! Introspection surface
//!
//! `JobView` is a read-only snapshot of a job's reportable state, generalized
//! from the teacher's Control-M report generators (the CSV/Tera rendering in
//! `infrastructure/output`) down to the two plain-text renderings the source
//! exposes directly: `Scheduler.list()` and `Scheduler.debrief()`.

use crate::domain::entities::{Job, JobId, JobState};

/// A point-in-time, read-only snapshot of one job, safe to hold onto after
/// the orchestration that produced it has moved on.
#[derive(serde::Serialize)]
pub struct JobView {
    pub id: JobId,
    pub label: Option<String>,
    pub state: JobState,
    pub critical: bool,
    pub forever: bool,
    pub done: bool,
    pub raised: bool,
}

impl JobView {
    pub fn of(job: &Job) -> Self {
        Self {
            id: job.id(),
            label: job.label().map(str::to_owned),
            state: job.state(),
            critical: job.critical(),
            forever: job.forever(),
            done: job.is_done(),
            raised: job.raised_exception().is_some(),
        }
    }

    fn name(&self) -> String {
        self.label.clone().unwrap_or_else(|| format!("job#{:?}", self.id))
    }

    /// One line: label, state, and a flag column, matching the density of
    /// the source's `Scheduler.list()` output.
    pub fn line(&self) -> String {
        let mut flags = String::new();
        if self.critical {
            flags.push_str(" critical");
        }
        if self.forever {
            flags.push_str(" forever");
        }
        format!("{:<24} {:?}{}", self.name(), self.state, flags)
    }

    /// The extra line `debrief(details=true)` appends per job: the raised
    /// exception's message, if any.
    pub fn detail(&self) -> String {
        if self.raised {
            "  -> raised".to_string()
        } else if self.done {
            "  -> ok".to_string()
        } else {
            "  -> pending".to_string()
        }
    }
}

/// Serializes a full job snapshot, for a host application that wants a
/// machine-readable post-mortem report instead of (or alongside) the plain
/// text `list`/`debrief` rendering — mirrors the teacher's
/// `JsonGenerator::generate_string` over its own report DTO.
pub fn to_json(jobs: &[JobView]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{FnJob, Job, JobOptions};

    #[test]
    fn json_report_round_trips_through_serde() {
        let job = Job::new(FnJob::new(|_| async { Ok(Box::new(()) as _) }), JobOptions::new().label("a")).unwrap();
        let views = vec![JobView::of(&job)];
        let json = to_json(&views).unwrap();
        assert!(json.contains("\"label\""));
        assert!(json.contains("\"a\""));
    }
}
