//! Concurrent, dependency-ordered teardown of remote stacks.
//!
//! This crate holds the coordination logic of unstack: the shared
//! `DependencyTable` counting outstanding dependents per stack, the per-stack
//! `DeletionWorker` state machine (blocked, polling, deleting, done, failed),
//! and the `Orchestrator` that runs one worker thread per stack and aggregates
//! their outcomes into a `RunReport`. Cancellation flows through a
//! `ShutdownToken` that every backoff wait observes.

pub mod orchestrator;
pub mod report;
pub mod shutdown;
pub mod table;
pub mod worker;

pub use orchestrator::{Orchestrator, TeardownOptions};
pub use report::{RunReport, StackOutcome};
pub use shutdown::{install_signal_handler, ShutdownToken};
pub use table::DependencyTable;
pub use worker::{DeletionWorker, WorkerError, WorkerState};

use thiserror::Error;
use unstack_schema::StackName;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("config error: {0}")]
    Config(#[from] unstack_schema::ConfigError),
    #[error("remote error: {0}")]
    Remote(#[from] unstack_remote::RemoteError),
    #[error("dependency table corruption: release of untracked stack '{0}'")]
    DependencyTableCorruption(StackName),
    #[error("deletion worker for '{0}' panicked")]
    WorkerPanicked(StackName),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
