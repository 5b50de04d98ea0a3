use crate::report::{RunReport, StackOutcome};
use crate::shutdown::ShutdownToken;
use crate::table::DependencyTable;
use crate::worker::DeletionWorker;
use crate::CoreError;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};
use unstack_remote::StackService;
use unstack_schema::{StackDescriptor, StackName, TeardownSection};

/// Polling cadence and retry budgets shared by every worker of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeardownOptions {
    /// Wait between checks while blocked, deleting, or retrying.
    pub poll_interval: Duration,
    /// Consecutive unusable answers (errors, unknown state) before a worker fails.
    pub max_attempts: u32,
    /// Acknowledged delete requests for a stack that stays present before failing.
    pub max_delete_requests: u32,
}

impl Default for TeardownOptions {
    fn default() -> Self {
        Self::from(&TeardownSection::default())
    }
}

impl From<&TeardownSection> for TeardownOptions {
    fn from(section: &TeardownSection) -> Self {
        Self {
            poll_interval: section.poll_interval(),
            max_attempts: section.max_attempts,
            max_delete_requests: section.max_delete_requests,
        }
    }
}

type FinishHook = Box<dyn Fn(&StackName, &StackOutcome) + Send + Sync>;

/// Runs one deletion worker per stack and collects their outcomes.
pub struct Orchestrator {
    service: Arc<dyn StackService>,
    options: TeardownOptions,
    on_finish: Option<FinishHook>,
}

impl Orchestrator {
    pub fn new(service: Arc<dyn StackService>, options: TeardownOptions) -> Self {
        Self {
            service,
            options,
            on_finish: None,
        }
    }

    /// Call `hook` from each worker thread as soon as its stack reaches an outcome.
    #[must_use]
    pub fn on_finish(
        mut self,
        hook: impl Fn(&StackName, &StackOutcome) + Send + Sync + 'static,
    ) -> Self {
        self.on_finish = Some(Box::new(hook));
        self
    }

    pub fn options(&self) -> &TeardownOptions {
        &self.options
    }

    /// Tear down every described stack and wait for all workers to finish.
    ///
    /// The list must be free of duplicates, unknown references and cycles
    /// (see `unstack_schema::validate_descriptors`).
    pub fn run(
        &self,
        descriptors: &[StackDescriptor],
        shutdown: &ShutdownToken,
    ) -> Result<RunReport, CoreError> {
        let table = DependencyTable::from_descriptors(descriptors);
        self.run_with_table(descriptors, &table, shutdown)
    }

    /// Like [`run`](Self::run), against a table the caller built and can observe.
    ///
    /// A fatal error (table corruption, a panicking worker, a failed thread
    /// spawn) cancels `shutdown` so the remaining workers stop, then is returned
    /// once every worker has exited.
    pub fn run_with_table(
        &self,
        descriptors: &[StackDescriptor],
        table: &DependencyTable,
        shutdown: &ShutdownToken,
    ) -> Result<RunReport, CoreError> {
        info!(
            "tearing down {} stack(s) via the {} backend",
            descriptors.len(),
            self.service.name()
        );
        let started_at = chrono::Utc::now().to_rfc3339();

        let (joined, spawn_error) = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(descriptors.len());
            let mut spawn_error = None;
            for descriptor in descriptors {
                let spawned = thread::Builder::new()
                    .name(format!("unstack-{}", descriptor.name))
                    .spawn_scoped(scope, move || self.run_worker(descriptor, table, shutdown));
                match spawned {
                    Ok(handle) => handles.push((descriptor.name.clone(), handle)),
                    Err(e) => {
                        error!("cannot spawn worker for {}: {e}", descriptor.name);
                        shutdown.cancel();
                        spawn_error = Some(e);
                        break;
                    }
                }
            }
            let joined: Vec<_> = handles
                .into_iter()
                .map(|(name, handle)| (name, handle.join()))
                .collect();
            (joined, spawn_error)
        });

        let mut outcomes = BTreeMap::new();
        let mut fatal = None;
        for (name, result) in joined {
            match result {
                Ok(Ok(outcome)) => {
                    outcomes.insert(name, outcome);
                }
                Ok(Err(e)) => {
                    fatal.get_or_insert(e);
                }
                Err(_) => {
                    fatal.get_or_insert(CoreError::WorkerPanicked(name));
                }
            }
        }
        if let Some(e) = spawn_error {
            return Err(CoreError::Io(e));
        }
        if let Some(e) = fatal {
            return Err(e);
        }

        let report = RunReport {
            started_at,
            finished_at: chrono::Utc::now().to_rfc3339(),
            outcomes,
            remaining_blockers: table.snapshot(),
        };
        if report.is_success() {
            info!("all {} stack(s) deleted", report.outcomes.len());
        } else {
            for (name, reason) in report.failures() {
                warn!("{name} not deleted: {reason}");
            }
        }
        Ok(report)
    }

    fn run_worker(
        &self,
        descriptor: &StackDescriptor,
        table: &DependencyTable,
        shutdown: &ShutdownToken,
    ) -> Result<StackOutcome, CoreError> {
        let worker = DeletionWorker::new(
            descriptor,
            table,
            self.service.as_ref(),
            shutdown,
            &self.options,
        );
        // A dead worker would leave its parents blocked forever; turn a panic
        // into a fatal error for the whole run instead.
        let result = catch_unwind(AssertUnwindSafe(|| worker.run()))
            .unwrap_or_else(|_| Err(CoreError::WorkerPanicked(descriptor.name.clone())));

        match &result {
            Ok(outcome) => {
                if let Some(hook) = &self.on_finish {
                    hook(&descriptor.name, outcome);
                }
            }
            Err(e) => {
                error!("aborting teardown: {e}");
                shutdown.cancel();
            }
        }
        result
    }
}
