pub mod body;
pub mod job;
pub mod requirement;
pub mod sequence;

pub use body::{FnJob, JobBody, JobFailure, JobOutput, TickJob};
pub use job::{Job, JobId, JobOptions, JobState, Outcome};
pub use requirement::IntoRequirement;
pub use sequence::{ChainLink, Sequence, SequenceOptions};
