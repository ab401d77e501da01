use std::{path::PathBuf, sync::Arc};

use emb_model::{Outcome, Payload, Task, TaskKey};

use crate::{queue::TaskQueue, registry::CompletionRegistry};

/// A reserved key whose task has not been enqueued yet.
///
/// Dropping it releases the key.
#[must_use = "a claim does nothing until submitted"]
pub struct Claim {
    registry: Arc<CompletionRegistry>,
    key: TaskKey,
    armed: bool,
}

impl Claim {
    pub(crate) fn new(registry: Arc<CompletionRegistry>, key: TaskKey) -> Self {
        Self {
            registry,
            key,
            armed: true,
        }
    }

    pub fn key(&self) -> &TaskKey {
        &self.key
    }

    /// Enqueue the task for this key and turn the claim into a [`Pending`] wait handle.
    pub fn submit(
        mut self,
        queue: &TaskQueue,
        payload: Payload,
        artifact_path: impl Into<PathBuf>,
    ) -> Pending {
        self.armed = false;
        queue.enqueue(Task::new(self.key.clone(), payload, artifact_path));
        Pending {
            registry: Arc::clone(&self.registry),
            key: self.key.clone(),
            armed: true,
        }
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        if self.armed {
            self.registry.release(&self.key);
        }
    }
}

/// Wait handle for an enqueued task.
///
/// Dropping it without calling [`Pending::wait`] abandons the request: the
/// outcome is discarded when the worker publishes it.
#[must_use = "dropping a pending handle abandons the request"]
pub struct Pending {
    registry: Arc<CompletionRegistry>,
    key: TaskKey,
    armed: bool,
}

impl Pending {
    pub fn key(&self) -> &TaskKey {
        &self.key
    }

    /// Block until the worker publishes the outcome for this key.
    ///
    /// The registry entry is consumed as part of the wait.
    pub fn wait(mut self) -> Outcome {
        let outcome = self.registry.await_outcome(&self.key);
        self.armed = false;
        outcome
    }
}

impl Drop for Pending {
    fn drop(&mut self) {
        if self.armed {
            self.registry.abandon(&self.key);
        }
    }
}
