use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, warn};
use unstack_remote::StackService;
use unstack_schema::{KeyName, KeysSection};

/// What key cleanup did after a teardown.
#[derive(Debug, Default, Serialize)]
pub struct KeyCleanup {
    pub removed_dir: Option<PathBuf>,
    /// Why the local key directory could not be removed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir_error: Option<String>,
    pub deleted: Vec<KeyName>,
    /// Named key pairs the service no longer had.
    pub missing: Vec<KeyName>,
    pub failed: Vec<KeyFailure>,
}

#[derive(Debug, Serialize)]
pub struct KeyFailure {
    pub key: KeyName,
    pub reason: String,
}

impl KeyCleanup {
    pub fn is_clean(&self) -> bool {
        self.dir_error.is_none() && self.failed.is_empty()
    }
}

/// Remove the local key directory, then every named key pair.
///
/// Keys that are already gone are not an error. Other failures, including a
/// key directory that cannot be removed, are collected and cleanup carries on.
pub fn purge(keys: &KeysSection, service: &dyn StackService) -> KeyCleanup {
    let mut cleanup = KeyCleanup::default();

    if let Some(dir) = &keys.local_dir {
        if dir.exists() {
            match std::fs::remove_dir_all(dir) {
                Ok(()) => {
                    debug!("removed local key directory {}", dir.display());
                    cleanup.removed_dir = Some(dir.clone());
                }
                Err(e) => {
                    let reason = format!("failed to remove key directory {}: {e}", dir.display());
                    warn!("{reason}");
                    cleanup.dir_error = Some(reason);
                }
            }
        } else {
            debug!("key directory {} does not exist", dir.display());
        }
    }

    for key in &keys.names {
        match service.delete_key_pair(key) {
            Ok(true) => cleanup.deleted.push(key.clone()),
            Ok(false) => cleanup.missing.push(key.clone()),
            Err(e) => {
                warn!("could not delete key pair {key}: {e}");
                cleanup.failed.push(KeyFailure {
                    key: key.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }
    cleanup
}
