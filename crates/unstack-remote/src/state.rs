use serde::{Deserialize, Serialize};
use std::fmt;

/// Snapshot of a stack as reported by the control plane.
///
/// Fetched fresh on every poll; nothing holds on to one beyond a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteStackState {
    /// The stack does not exist (never created or fully deleted).
    Absent,
    /// A deletion has been accepted and is running.
    DeleteInProgress,
    /// The stack exists and nothing is deleting it.
    OtherStable,
    /// The control plane answered but the state could not be interpreted.
    Unknown,
}

impl RemoteStackState {
    /// Map a control-plane status string (CloudFormation naming) to a state.
    pub fn from_status(status: &str) -> Self {
        match status.trim() {
            "" => Self::Unknown,
            "DELETE_COMPLETE" => Self::Absent,
            "DELETE_IN_PROGRESS" => Self::DeleteInProgress,
            _ => Self::OtherStable,
        }
    }

    /// Status string the reference server reports for this state.
    pub fn as_status(self) -> &'static str {
        match self {
            Self::Absent => "DELETE_COMPLETE",
            Self::DeleteInProgress => "DELETE_IN_PROGRESS",
            Self::OtherStable => "CREATE_COMPLETE",
            Self::Unknown => "",
        }
    }
}

impl fmt::Display for RemoteStackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Absent => "absent",
            Self::DeleteInProgress => "delete_in_progress",
            Self::OtherStable => "present",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}
