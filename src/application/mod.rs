pub mod scheduler;
pub mod services;

pub use scheduler::{Scheduler, SchedulerOptions};
pub use services::OrchestrateOptions;
