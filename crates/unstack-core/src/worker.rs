use crate::orchestrator::TeardownOptions;
use crate::report::StackOutcome;
use crate::shutdown::ShutdownToken;
use crate::table::DependencyTable;
use crate::CoreError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use unstack_remote::{RemoteStackState, StackService};
use unstack_schema::{StackDescriptor, StackName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Blocked,
    Polling,
    Deleting,
    Done,
    Failed,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Blocked => "blocked",
            Self::Polling => "polling",
            Self::Deleting => "deleting",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// States the run loop can be in. `Failed` is never entered: giving up
/// returns straight out of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Blocked,
    Polling,
    Deleting,
    Done,
}

impl From<Phase> for WorkerState {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Blocked => Self::Blocked,
            Phase::Polling => Self::Polling,
            Phase::Deleting => Self::Deleting,
            Phase::Done => Self::Done,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Attempt {
    Query,
    Request,
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Query => "describe",
            Self::Request => "delete request",
        })
    }
}

/// Why a worker gave up on its stack.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerError {
    #[error("retry budget exhausted after {attempts} attempts: {last_error}")]
    RetryBudgetExhausted { attempts: u32, last_error: String },
    #[error("stack still present after {requests} acknowledged delete requests")]
    DeleteNotProgressing { requests: u32 },
    /// The service answered with an error that waiting will not fix.
    #[error("unrecoverable remote error: {reason}")]
    Unrecoverable { reason: String },
}

/// Drives one stack from blocked to confirmed deleted.
///
/// The worker only ever releases its parents after observing the stack as
/// absent. Any other ending leaves the parents' counts in place and marks them
/// stranded so their workers stop waiting.
pub struct DeletionWorker<'a> {
    descriptor: &'a StackDescriptor,
    table: &'a DependencyTable,
    service: &'a dyn StackService,
    shutdown: &'a ShutdownToken,
    options: &'a TeardownOptions,
    phase: Phase,
    /// Consecutive describes without a usable answer.
    query_failures: u32,
    /// Consecutive delete requests the service did not accept.
    request_failures: u32,
    delete_requests: u32,
    last_error: String,
}

impl<'a> DeletionWorker<'a> {
    pub fn new(
        descriptor: &'a StackDescriptor,
        table: &'a DependencyTable,
        service: &'a dyn StackService,
        shutdown: &'a ShutdownToken,
        options: &'a TeardownOptions,
    ) -> Self {
        Self {
            descriptor,
            table,
            service,
            shutdown,
            options,
            phase: Phase::Blocked,
            query_failures: 0,
            request_failures: 0,
            delete_requests: 0,
            last_error: String::new(),
        }
    }

    pub fn state(&self) -> WorkerState {
        self.phase.into()
    }

    /// Run the state machine to a terminal outcome.
    ///
    /// Only a release of an untracked parent is returned as an error; every
    /// per-stack problem ends up in the [`StackOutcome`].
    #[allow(clippy::too_many_lines)]
    pub fn run(mut self) -> Result<StackOutcome, CoreError> {
        let descriptor = self.descriptor;
        let name = &descriptor.name;
        self.phase = if self.table.is_blocked(name) {
            Phase::Blocked
        } else {
            Phase::Polling
        };
        debug!("{name}: starting in {}", self.state());

        loop {
            if self.shutdown.is_cancelled() {
                return Ok(self.cancelled());
            }

            match self.phase {
                Phase::Blocked => {
                    if let Some(blocked_by) = self.table.stranded_by(name) {
                        return Ok(self.stranded(blocked_by));
                    }
                    if self.table.is_blocked(name) {
                        debug!(
                            "{name}: waiting on {} dependent stack(s)",
                            self.table.count(name)
                        );
                        if self.pause() {
                            return Ok(self.cancelled());
                        }
                    } else {
                        self.transition(Phase::Polling);
                    }
                }
                Phase::Polling => match self.service.describe(name) {
                    Ok(RemoteStackState::Absent) => self.transition(Phase::Done),
                    Ok(RemoteStackState::DeleteInProgress) => {
                        self.query_failures = 0;
                        debug!("{name}: deletion in progress");
                        if self.pause() {
                            return Ok(self.cancelled());
                        }
                    }
                    Ok(RemoteStackState::OtherStable) => {
                        self.query_failures = 0;
                        if self.delete_requests >= self.options.max_delete_requests {
                            return Ok(self.fail(WorkerError::DeleteNotProgressing {
                                requests: self.delete_requests,
                            }));
                        }
                        self.transition(Phase::Deleting);
                    }
                    Ok(RemoteStackState::Unknown) => {
                        let reason = "stack state unknown".to_owned();
                        if let Some(outcome) = self.record_failure(Attempt::Query, reason) {
                            return Ok(outcome);
                        }
                        if self.pause() {
                            return Ok(self.cancelled());
                        }
                    }
                    Err(e) if !e.is_transient() => {
                        return Ok(self.fail(WorkerError::Unrecoverable {
                            reason: e.to_string(),
                        }));
                    }
                    Err(e) => {
                        if let Some(outcome) = self.record_failure(Attempt::Query, e.to_string()) {
                            return Ok(outcome);
                        }
                        if self.pause() {
                            return Ok(self.cancelled());
                        }
                    }
                },
                Phase::Deleting => {
                    match self.service.request_delete(name) {
                        Ok(()) => {
                            self.request_failures = 0;
                            self.delete_requests += 1;
                            info!("deleting {name}");
                        }
                        Err(e) if !e.is_transient() => {
                            return Ok(self.fail(WorkerError::Unrecoverable {
                                reason: e.to_string(),
                            }));
                        }
                        Err(e) => {
                            if let Some(outcome) = self.record_failure(Attempt::Request, e.to_string())
                            {
                                return Ok(outcome);
                            }
                        }
                    }
                    self.transition(Phase::Polling);
                    if self.pause() {
                        return Ok(self.cancelled());
                    }
                }
                Phase::Done => {
                    for parent in &descriptor.depends_on {
                        let remaining = self.table.release(parent)?;
                        debug!("{name}: released {parent} ({remaining} left)");
                    }
                    info!("finished deleting {name}");
                    return Ok(StackOutcome::Deleted {
                        delete_requests: self.delete_requests,
                    });
                }
            }
        }
    }

    fn transition(&mut self, next: Phase) {
        debug!(
            "{}: {} -> {}",
            self.descriptor.name,
            self.state(),
            WorkerState::from(next)
        );
        self.phase = next;
    }

    /// Returns `true` if the run was cancelled during the wait.
    fn pause(&self) -> bool {
        self.shutdown.wait(self.options.poll_interval)
    }

    /// Count a failed describe or delete request against its own budget.
    fn record_failure(&mut self, attempt: Attempt, reason: String) -> Option<StackOutcome> {
        let failures = match attempt {
            Attempt::Query => &mut self.query_failures,
            Attempt::Request => &mut self.request_failures,
        };
        *failures += 1;
        let failures = *failures;
        warn!(
            "{}: {attempt} attempt {failures}/{} failed: {reason}",
            self.descriptor.name, self.options.max_attempts
        );
        self.last_error = reason;
        if failures >= self.options.max_attempts {
            let last_error = std::mem::take(&mut self.last_error);
            return Some(self.fail(WorkerError::RetryBudgetExhausted {
                attempts: failures,
                last_error,
            }));
        }
        None
    }

    fn fail(&self, error: WorkerError) -> StackOutcome {
        error!(
            "{}: giving up while {}: {error}",
            self.descriptor.name,
            self.state()
        );
        self.strand_parents();
        StackOutcome::Failed { error }
    }

    fn stranded(&mut self, blocked_by: Vec<StackName>) -> StackOutcome {
        warn!(
            "{}: will not be deleted, dependent stack(s) failed: {}",
            self.descriptor.name,
            join_names(&blocked_by)
        );
        self.strand_parents();
        StackOutcome::Stranded { blocked_by }
    }

    fn cancelled(&self) -> StackOutcome {
        info!("{}: cancelled while {}", self.descriptor.name, self.state());
        StackOutcome::Cancelled {
            state: self.state(),
        }
    }

    fn strand_parents(&self) {
        for parent in &self.descriptor.depends_on {
            self.table.strand(parent, &self.descriptor.name);
        }
    }
}

pub(crate) fn join_names(names: &[StackName]) -> String {
    names
        .iter()
        .map(StackName::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
