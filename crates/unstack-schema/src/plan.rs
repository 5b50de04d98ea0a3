//! Deletion waves: the order a teardown is expected to progress in.
//!
//! Wave 0 holds every stack nothing depends on. Each later wave holds the
//! stacks whose dependents all sit in earlier waves. The orchestrator does not
//! follow waves (workers unblock individually), but the plan is what `unstack
//! plan` prints and how cycles are found.

use crate::config::ConfigError;
use crate::descriptor::StackDescriptor;
use crate::types::StackName;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DeletionPlan {
    pub waves: Vec<Vec<StackName>>,
}

impl DeletionPlan {
    pub fn stack_count(&self) -> usize {
        self.waves.iter().map(Vec::len).sum()
    }
}

/// Compute deletion waves with Kahn's algorithm over the reversed edges.
///
/// Descriptors must already have unique names and known references; a cycle
/// yields [`ConfigError::Cycle`] listing every stack that could not be placed.
pub fn deletion_plan(descriptors: &[StackDescriptor]) -> Result<DeletionPlan, ConfigError> {
    // Outstanding dependents per stack; a stack is ready once this hits zero.
    let mut dependents: HashMap<&str, usize> = descriptors
        .iter()
        .map(|d| (d.name.as_str(), 0))
        .collect();
    for d in descriptors {
        for parent in &d.depends_on {
            if let Some(count) = dependents.get_mut(parent.as_str()) {
                *count += 1;
            }
        }
    }

    let by_name: HashMap<&str, &StackDescriptor> =
        descriptors.iter().map(|d| (d.name.as_str(), d)).collect();

    let mut ready: BTreeSet<&str> = dependents
        .iter()
        .filter(|(_, &count)| count == 0)
        .map(|(name, _)| *name)
        .collect();

    let mut waves = Vec::new();
    let mut placed = 0;
    while !ready.is_empty() {
        let wave: Vec<&str> = std::mem::take(&mut ready).into_iter().collect();
        for name in &wave {
            for parent in &by_name[name].depends_on {
                if let Some(count) = dependents.get_mut(parent.as_str()) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(parent.as_str());
                    }
                }
            }
        }
        placed += wave.len();
        waves.push(wave.into_iter().map(StackName::from).collect());
    }

    if placed != dependents.len() {
        let mut stuck: Vec<StackName> = dependents
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|(name, _)| StackName::from(name))
            .collect();
        stuck.sort();
        return Err(ConfigError::Cycle(stuck));
    }

    Ok(DeletionPlan { waves })
}
