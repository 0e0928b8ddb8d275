//! Error types module
//!
//! Construction errors are surfaced synchronously at the call site that
//! produced them; graph errors are surfaced only as `rain_check()` /
//! `orchestrate()` returning `false` (see `application::services::graph_validator`).

use thiserror::Error;

/// Programmer errors raised synchronously while building the job graph.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConstructionError {
    /// A job's `required` set, however deeply nested the input was,
    /// resolved to include the job itself.
    #[error("a job cannot require itself")]
    SelfRequirement,
}

/// Errors found by the pre-orchestration graph validator ("rain check").
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The `required` graph over the scheduler's jobs could not be fully
    /// peeled into a topological order; `.0` is the number of jobs left in
    /// the unresolved (cyclic) remainder.
    #[error("dependency graph contains a cycle touching {0} job(s)")]
    Cycle(usize),
    /// A job requires a prerequisite that is not a member of the same
    /// scheduler's job set.
    #[error("prerequisite does not belong to this scheduler's job set")]
    UnknownPrerequisite,
}
