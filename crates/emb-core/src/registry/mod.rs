//! Completion registry: correlates task keys with outcomes.
//!
//! One mutex guards both maps and the wait predicate. `publish` broadcasts to
//! every waiter; each waiter re-checks its own key and goes back to sleep if
//! the outcome is not its own. That is O(n) wakeups per completion, which is
//! fine while the number of concurrently waiting requests stays small.
mod claim;
pub use claim::{Claim, Pending};

use std::{collections::HashMap, fmt, sync::Arc};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use emb_model::{Outcome, TaskKey};

use crate::error::CoreError;

/// What the producer that claimed a key still expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interest {
    /// A producer owns the key and will collect the outcome.
    Waiting,
    /// The producer went away; drop the outcome when it arrives.
    Abandoned,
}

#[derive(Default)]
struct Slots {
    interest: HashMap<TaskKey, Interest>,
    outcomes: HashMap<TaskKey, Outcome>,
}

#[derive(Default)]
pub struct CompletionRegistry {
    slots: Mutex<Slots>,
    done: Condvar,
}

impl CompletionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `key` for the calling producer.
    ///
    /// Fails with [`CoreError::KeyInUse`] while another request with the same key
    /// is in flight, including an abandoned one whose outcome has not arrived yet.
    pub fn claim(self: &Arc<Self>, key: TaskKey) -> Result<Claim, CoreError> {
        let mut slots = self.slots.lock();
        if slots.interest.contains_key(&key) {
            return Err(CoreError::KeyInUse(key));
        }
        slots.interest.insert(key.clone(), Interest::Waiting);
        trace!(key = %key, "key claimed");
        Ok(Claim::new(Arc::clone(self), key))
    }

    /// Record an outcome and wake every waiter.
    ///
    /// Returns `false` when nobody is waiting for the key and the outcome was discarded.
    pub fn publish(&self, outcome: Outcome) -> bool {
        let mut slots = self.slots.lock();
        let key = outcome.key().clone();
        match slots.interest.get(&key).copied() {
            Some(Interest::Waiting) => {
                slots.outcomes.insert(key, outcome);
                drop(slots);
                self.done.notify_all();
                true
            }
            Some(Interest::Abandoned) => {
                slots.interest.remove(&key);
                debug!(key = %key, "outcome for abandoned request discarded");
                false
            }
            None => {
                warn!(key = %key, "outcome for unclaimed key discarded");
                false
            }
        }
    }

    /// Block until the outcome for `key` is present, then remove and return it.
    ///
    /// Read and delete happen under the same lock, so the entry is consumed exactly once.
    pub(crate) fn await_outcome(&self, key: &TaskKey) -> Outcome {
        let mut slots = self.slots.lock();
        loop {
            if let Some(outcome) = slots.outcomes.remove(key) {
                slots.interest.remove(key);
                return outcome;
            }
            self.done.wait(&mut slots);
        }
    }

    /// Forget a key whose task was never enqueued.
    pub(crate) fn release(&self, key: &TaskKey) {
        let mut slots = self.slots.lock();
        slots.interest.remove(key);
        slots.outcomes.remove(key);
    }

    /// Give up on a key whose task is queued or running.
    pub(crate) fn abandon(&self, key: &TaskKey) {
        let mut slots = self.slots.lock();
        if slots.outcomes.remove(key).is_some() {
            slots.interest.remove(key);
        } else if slots.interest.contains_key(key) {
            slots.interest.insert(key.clone(), Interest::Abandoned);
        }
        debug!(key = %key, "pending request abandoned");
    }

    /// Number of keys currently claimed (waiting or abandoned).
    pub fn in_flight(&self) -> usize {
        self.slots.lock().interest.len()
    }

    /// Number of published outcomes not yet collected.
    pub fn unconsumed(&self) -> usize {
        self.slots.lock().outcomes.len()
    }
}

impl fmt::Debug for CompletionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.lock();
        f.debug_struct("CompletionRegistry")
            .field("in_flight", &slots.interest.len())
            .field("unconsumed", &slots.outcomes.len())
            .finish()
    }
}
