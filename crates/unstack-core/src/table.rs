use crate::CoreError;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use unstack_schema::{StackDescriptor, StackName};

/// Outstanding dependents per stack, shared by every deletion worker.
///
/// An entry exists only while its count is positive, so "not in the table"
/// means "nothing left blocks this stack". A single mutex guards the whole map;
/// it is held for one lookup or update at a time and never across a wait or a
/// remote call.
#[derive(Debug, Default)]
pub struct DependencyTable {
    inner: Mutex<TableInner>,
}

#[derive(Debug, Default)]
struct TableInner {
    counts: HashMap<StackName, usize>,
    /// Parents that can never unblock, with the dependents that failed.
    stranded: HashMap<StackName, Vec<StackName>>,
}

impl DependencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// One blocker per `depends_on` edge, counted by target.
    pub fn from_descriptors(descriptors: &[StackDescriptor]) -> Self {
        let table = Self::new();
        for d in descriptors {
            for parent in &d.depends_on {
                table.increment(parent);
            }
        }
        table
    }

    /// Add one blocker for `name`. Only meant for construction, before workers start.
    pub fn increment(&self, name: &StackName) {
        *self.lock().counts.entry(name.clone()).or_insert(0) += 1;
    }

    /// Drop one blocker for `name` and return how many remain.
    ///
    /// The entry is removed when the count reaches zero. Releasing a stack the
    /// table does not track means the descriptor list and the table disagree.
    pub fn release(&self, name: &StackName) -> Result<usize, CoreError> {
        let mut inner = self.lock();
        let Some(count) = inner.counts.get_mut(name.as_str()) else {
            return Err(CoreError::DependencyTableCorruption(name.clone()));
        };
        *count = count.saturating_sub(1);
        let remaining = *count;
        if remaining == 0 {
            inner.counts.remove(name.as_str());
        }
        Ok(remaining)
    }

    pub fn is_blocked(&self, name: &str) -> bool {
        self.lock().counts.contains_key(name)
    }

    pub fn count(&self, name: &str) -> usize {
        self.lock().counts.get(name).copied().unwrap_or(0)
    }

    /// Record that `dependent` failed, so `parent` will never be released.
    pub fn strand(&self, parent: &StackName, dependent: &StackName) {
        let mut inner = self.lock();
        let failed = inner.stranded.entry(parent.clone()).or_default();
        if !failed.contains(dependent) {
            failed.push(dependent.clone());
        }
    }

    /// Failed dependents of `name`, if any.
    pub fn stranded_by(&self, name: &str) -> Option<Vec<StackName>> {
        self.lock().stranded.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().counts.is_empty()
    }

    /// Sorted copy of the current counts.
    pub fn snapshot(&self) -> BTreeMap<StackName, usize> {
        self.lock()
            .counts
            .iter()
            .map(|(name, count)| (name.clone(), *count))
            .collect()
    }

    // No code path panics while holding the lock, so a poisoned guard still
    // holds consistent counts.
    fn lock(&self) -> MutexGuard<'_, TableInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn name(s: &str) -> StackName {
        StackName::from(s)
    }

    fn shared_parent() -> Vec<StackDescriptor> {
        vec![
            StackDescriptor::root("a"),
            StackDescriptor::new("b", ["a"]),
            StackDescriptor::new("c", ["a"]),
        ]
    }

    #[test]
    fn counts_one_per_dependent() {
        let table = DependencyTable::from_descriptors(&shared_parent());
        assert_eq!(table.count("a"), 2);
        assert!(table.is_blocked("a"));
        assert!(!table.is_blocked("b"));
        assert!(!table.is_blocked("c"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn release_removes_entry_at_zero() {
        let table = DependencyTable::from_descriptors(&shared_parent());
        assert_eq!(table.release(&name("a")).unwrap(), 1);
        assert_eq!(table.snapshot(), BTreeMap::from([(name("a"), 1)]));
        assert_eq!(table.release(&name("a")).unwrap(), 0);
        assert!(!table.is_blocked("a"));
        assert!(table.is_empty());
    }

    #[test]
    fn release_of_untracked_stack_is_corruption() {
        let table = DependencyTable::from_descriptors(&shared_parent());
        let err = table.release(&name("zzz")).unwrap_err();
        assert!(matches!(err, CoreError::DependencyTableCorruption(ref n) if n == "zzz"));
    }

    #[test]
    fn release_after_drain_is_corruption() {
        let table = DependencyTable::new();
        table.increment(&name("a"));
        table.release(&name("a")).unwrap();
        assert!(table.release(&name("a")).is_err());
    }

    #[test]
    fn roots_without_dependents_never_enter_table() {
        let table = DependencyTable::from_descriptors(&[
            StackDescriptor::root("x"),
            StackDescriptor::root("y"),
        ]);
        assert!(table.is_empty());
        assert_eq!(table.count("x"), 0);
    }

    #[test]
    fn concurrent_releases_remove_key_exactly_once() {
        const DEPENDENTS: usize = 64;
        let table = Arc::new(DependencyTable::new());
        let key = name("shared");
        for _ in 0..DEPENDENTS {
            table.increment(&key);
        }

        let zero_seen = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..DEPENDENTS)
            .map(|_| {
                let table = Arc::clone(&table);
                let zero_seen = Arc::clone(&zero_seen);
                let key = key.clone();
                std::thread::spawn(move || {
                    let remaining = table.release(&key).unwrap();
                    assert!(remaining < DEPENDENTS);
                    if remaining == 0 {
                        zero_seen.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(zero_seen.load(Ordering::SeqCst), 1);
        assert!(table.is_empty());
        assert!(table.release(&key).is_err());
    }

    #[test]
    fn concurrent_releases_on_many_keys() {
        let descriptors: Vec<StackDescriptor> = (0..32)
            .map(|i| StackDescriptor::new(format!("child-{i}"), ["p0", "p1", "p2"]))
            .chain(["p0", "p1", "p2"].into_iter().map(StackDescriptor::root))
            .collect();
        let table = Arc::new(DependencyTable::from_descriptors(&descriptors));
        assert_eq!(table.count("p1"), 32);

        let handles: Vec<_> = descriptors
            .iter()
            .filter(|d| !d.depends_on.is_empty())
            .cloned()
            .map(|d| {
                let table = Arc::clone(&table);
                std::thread::spawn(move || {
                    for parent in &d.depends_on {
                        table.release(parent).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(table.is_empty());
    }

    #[test]
    fn strand_records_each_dependent_once() {
        let table = DependencyTable::from_descriptors(&shared_parent());
        assert!(table.stranded_by("a").is_none());
        table.strand(&name("a"), &name("b"));
        table.strand(&name("a"), &name("b"));
        assert_eq!(table.stranded_by("a"), Some(vec![name("b")]));
        // Stranding never touches the counts.
        assert_eq!(table.count("a"), 2);
    }
}
