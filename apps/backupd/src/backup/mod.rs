pub mod error;
pub mod orchestrator;
pub mod prune;
pub mod quiesce;
pub mod scheduler;
pub mod snapshot;

#[cfg(test)]
mod testing;

pub use orchestrator::{BackupPolicy, Orchestrator};
pub use quiesce::QuiesceTiming;
pub use scheduler::Scheduler;
pub use snapshot::RetryPolicy;
