//! In-process orchestrator for a DAG of asynchronous jobs.
//!
//! A job graph is built from [`Job`]s and [`Sequence`]s, validated with
//! [`Scheduler::rain_check`], and driven to completion with
//! [`Scheduler::orchestrate`] under an optional concurrency window and
//! global timeout. See `DESIGN.md` for how each piece is grounded.

pub mod application;
pub mod domain;
pub mod error;
pub mod presentation;

pub use application::{OrchestrateOptions, Scheduler, SchedulerOptions};
pub use domain::entities::{ChainLink, FnJob, IntoRequirement, Job, JobBody, JobFailure, JobId, JobOptions, JobOutput, JobState, Outcome, Sequence, SequenceOptions, TickJob};
pub use error::{ConstructionError, GraphError};
pub use presentation::{to_json, JobView};
