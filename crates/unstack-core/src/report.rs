use crate::worker::{WorkerError, WorkerState};
use serde::Serialize;
use std::collections::BTreeMap;
use unstack_schema::StackName;

/// How a single stack's worker ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StackOutcome {
    /// Confirmed absent; parents released.
    Deleted { delete_requests: u32 },
    /// Gave up on the stack itself.
    Failed { error: WorkerError },
    /// Still blocked: a dependent failed, so this stack was left in place.
    Stranded { blocked_by: Vec<StackName> },
    /// The run was cancelled while the worker was in `state`.
    Cancelled { state: WorkerState },
}

impl StackOutcome {
    pub fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted { .. })
    }

    /// Human-readable reason for anything other than a deletion.
    pub fn reason(&self) -> Option<String> {
        match self {
            Self::Deleted { .. } => None,
            Self::Failed { error } => Some(error.to_string()),
            Self::Stranded { blocked_by } => Some(format!(
                "blocked by failed dependent(s): {}",
                crate::worker::join_names(blocked_by)
            )),
            Self::Cancelled { state } => Some(format!("cancelled while {state}")),
        }
    }
}

/// Aggregate result of one orchestrator run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: String,
    pub finished_at: String,
    pub outcomes: BTreeMap<StackName, StackOutcome>,
    /// Dependency counts left in the table when the run ended.
    pub remaining_blockers: BTreeMap<StackName, usize>,
}

impl RunReport {
    /// Every stack reached `Done`.
    pub fn is_success(&self) -> bool {
        self.outcomes.values().all(StackOutcome::is_deleted)
    }

    pub fn was_cancelled(&self) -> bool {
        self.outcomes
            .values()
            .any(|o| matches!(o, StackOutcome::Cancelled { .. }))
    }

    pub fn deleted(&self) -> impl Iterator<Item = &StackName> {
        self.outcomes
            .iter()
            .filter(|(_, o)| o.is_deleted())
            .map(|(name, _)| name)
    }

    /// Stacks that did not reach `Done`, with the reason, in name order.
    pub fn failures(&self) -> Vec<(&StackName, String)> {
        self.outcomes
            .iter()
            .filter_map(|(name, o)| o.reason().map(|reason| (name, reason)))
            .collect()
    }

    pub fn total_delete_requests(&self) -> u32 {
        self.outcomes
            .values()
            .map(|o| match o {
                StackOutcome::Deleted { delete_requests } => *delete_requests,
                _ => 0,
            })
            .sum()
    }
}
