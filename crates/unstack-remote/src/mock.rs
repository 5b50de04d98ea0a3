use crate::{RemoteError, RemoteStackState, StackService};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use unstack_schema::{KeyName, StackName};

/// One scripted answer to `describe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockResponse {
    State(RemoteStackState),
    QueryError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Present,
    Deleting { remaining: u32 },
    Gone,
}

#[derive(Debug)]
struct MockStack {
    lifecycle: Lifecycle,
    script: VecDeque<MockResponse>,
    failing_deletes: u32,
    rejects_deletes: bool,
    describe_calls: u32,
    delete_requests: u32,
}

impl MockStack {
    fn new(lifecycle: Lifecycle) -> Self {
        Self {
            lifecycle,
            script: VecDeque::new(),
            failing_deletes: 0,
            rejects_deletes: false,
            describe_calls: 0,
            delete_requests: 0,
        }
    }
}

type DeleteHook = Box<dyn Fn(&StackName) + Send + Sync>;

/// In-memory control plane.
///
/// Stacks registered with [`with_stack`](Self::with_stack) start out present.
/// A delete request moves them to deleting, where they report
/// `DeleteInProgress` for `delete_polls` describes before turning absent.
/// Unregistered stacks read as absent. Scripted responses take precedence over
/// the lifecycle until the script runs out.
pub struct MockStackService {
    stacks: Mutex<HashMap<StackName, MockStack>>,
    keys: Mutex<HashSet<KeyName>>,
    delete_polls: u32,
    on_delete: Option<DeleteHook>,
}

impl Default for MockStackService {
    fn default() -> Self {
        Self {
            stacks: Mutex::new(HashMap::new()),
            keys: Mutex::new(HashSet::new()),
            delete_polls: 1,
            on_delete: None,
        }
    }
}

impl MockStackService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every named stack present, converging after `delete_polls` in-progress polls.
    pub fn converging<I, S>(stacks: I, delete_polls: u32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<StackName>,
    {
        let mut mock = Self::new().with_delete_polls(delete_polls);
        for name in stacks {
            mock = mock.with_stack(name);
        }
        mock
    }

    #[must_use]
    pub fn with_delete_polls(mut self, polls: u32) -> Self {
        self.delete_polls = polls;
        self
    }

    #[must_use]
    pub fn with_stack(self, name: impl Into<StackName>) -> Self {
        self.entries()
            .insert(name.into(), MockStack::new(Lifecycle::Present));
        self
    }

    /// Queue describe answers for a stack ahead of its lifecycle.
    #[must_use]
    pub fn with_script(
        self,
        name: impl Into<StackName>,
        script: impl IntoIterator<Item = MockResponse>,
    ) -> Self {
        self.entries()
            .entry(name.into())
            .or_insert_with(|| MockStack::new(Lifecycle::Gone))
            .script
            .extend(script);
        self
    }

    /// Fail the next `count` delete requests for a stack (`u32::MAX` = always).
    #[must_use]
    pub fn with_failing_deletes(self, name: impl Into<StackName>, count: u32) -> Self {
        self.entries()
            .entry(name.into())
            .or_insert_with(|| MockStack::new(Lifecycle::Present))
            .failing_deletes = count;
        self
    }

    /// Acknowledge delete requests for a stack but never start deleting it.
    #[must_use]
    pub fn with_rejected_deletes(self, name: impl Into<StackName>) -> Self {
        self.entries()
            .entry(name.into())
            .or_insert_with(|| MockStack::new(Lifecycle::Present))
            .rejects_deletes = true;
        self
    }

    #[must_use]
    pub fn with_key(self, name: impl Into<KeyName>) -> Self {
        self.key_set().insert(name.into());
        self
    }

    /// Run `hook` with the stack name before every delete request is handled.
    #[must_use]
    pub fn on_delete(mut self, hook: impl Fn(&StackName) + Send + Sync + 'static) -> Self {
        self.on_delete = Some(Box::new(hook));
        self
    }

    pub fn delete_requests(&self, name: &str) -> u32 {
        self.entries().get(name).map_or(0, |s| s.delete_requests)
    }

    pub fn total_delete_requests(&self) -> u32 {
        self.entries().values().map(|s| s.delete_requests).sum()
    }

    pub fn describe_calls(&self, name: &str) -> u32 {
        self.entries().get(name).map_or(0, |s| s.describe_calls)
    }

    pub fn is_present(&self, name: &str) -> bool {
        self.entries()
            .get(name)
            .is_some_and(|s| s.lifecycle != Lifecycle::Gone)
    }

    pub fn has_key(&self, name: &str) -> bool {
        self.key_set().contains(name)
    }

    // Mock state is plain data; a panicking test thread cannot leave it half-updated.
    fn entries(&self) -> MutexGuard<'_, HashMap<StackName, MockStack>> {
        self.stacks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn key_set(&self) -> MutexGuard<'_, HashSet<KeyName>> {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StackService for MockStackService {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn describe(&self, stack: &StackName) -> Result<RemoteStackState, RemoteError> {
        let mut entries = self.entries();
        let entry = entries
            .entry(stack.clone())
            .or_insert_with(|| MockStack::new(Lifecycle::Gone));
        entry.describe_calls += 1;

        if let Some(scripted) = entry.script.pop_front() {
            return match scripted {
                MockResponse::State(state) => Ok(state),
                MockResponse::QueryError => Err(RemoteError::Query {
                    stack: stack.clone(),
                    reason: "scripted query failure".to_owned(),
                }),
            };
        }

        Ok(match entry.lifecycle {
            Lifecycle::Present => RemoteStackState::OtherStable,
            Lifecycle::Deleting { remaining: 0 } | Lifecycle::Gone => {
                entry.lifecycle = Lifecycle::Gone;
                RemoteStackState::Absent
            }
            Lifecycle::Deleting { remaining } => {
                entry.lifecycle = Lifecycle::Deleting {
                    remaining: remaining - 1,
                };
                RemoteStackState::DeleteInProgress
            }
        })
    }

    fn request_delete(&self, stack: &StackName) -> Result<(), RemoteError> {
        if let Some(hook) = &self.on_delete {
            hook(stack);
        }

        let mut entries = self.entries();
        let entry = entries
            .entry(stack.clone())
            .or_insert_with(|| MockStack::new(Lifecycle::Gone));
        entry.delete_requests += 1;

        if entry.failing_deletes > 0 {
            if entry.failing_deletes != u32::MAX {
                entry.failing_deletes -= 1;
            }
            return Err(RemoteError::Request {
                stack: stack.clone(),
                reason: "scripted request failure".to_owned(),
            });
        }

        if entry.lifecycle == Lifecycle::Present && !entry.rejects_deletes {
            entry.lifecycle = Lifecycle::Deleting {
                remaining: self.delete_polls,
            };
        }
        Ok(())
    }

    fn delete_key_pair(&self, key: &KeyName) -> Result<bool, RemoteError> {
        Ok(self.key_set().remove(key.as_str()))
    }
}
