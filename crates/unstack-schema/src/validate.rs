use crate::config::ConfigError;
use crate::descriptor::StackDescriptor;
use crate::plan::deletion_plan;
use std::collections::HashSet;

/// Reject descriptor lists the orchestrator cannot tear down safely.
///
/// Checks, in order: non-empty names, unique names, no self references, every
/// `depends_on` entry names a declared stack, and the graph is acyclic. A
/// cyclic list would leave every worker on the cycle blocked forever.
pub fn validate_descriptors(descriptors: &[StackDescriptor]) -> Result<(), ConfigError> {
    let mut seen = HashSet::with_capacity(descriptors.len());
    for (index, d) in descriptors.iter().enumerate() {
        if d.name.trim().is_empty() {
            return Err(ConfigError::EmptyStackName { index });
        }
        if !seen.insert(d.name.as_str()) {
            return Err(ConfigError::DuplicateStack(d.name.clone()));
        }
    }

    for d in descriptors {
        for dep in &d.depends_on {
            if *dep == d.name {
                return Err(ConfigError::SelfDependency(d.name.clone()));
            }
            if !seen.contains(dep.as_str()) {
                return Err(ConfigError::UnknownDependency {
                    stack: d.name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    deletion_plan(descriptors).map(|_| ())
}
