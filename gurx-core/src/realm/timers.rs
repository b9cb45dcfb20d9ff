//! Timer Registry
//!
//! Timer-based operators (throttle, debounce) schedule their delayed
//! emissions here. Every pending timer is a tokio task tracked by its abort
//! handle, so tearing the realm down cancels all of them at once.

use std::collections::HashMap;

use tokio::runtime::Handle;
use tokio::task::AbortHandle;

/// Identifier of a scheduled timer, unique within its realm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// Pending timers of one realm.
#[derive(Debug)]
pub(crate) struct TimerRegistry {
    next_id: u64,
    pending: HashMap<TimerId, AbortHandle>,
    /// Runtime captured when the realm was built. Used when a timer is
    /// scheduled from outside any runtime context.
    handle: Option<Handle>,
    disposed: bool,
}

impl TimerRegistry {
    pub(crate) fn new(handle: Option<Handle>) -> Self {
        Self {
            next_id: 0,
            pending: HashMap::new(),
            handle,
            disposed: false,
        }
    }

    /// Runtime to spawn on: the current one, else the captured one.
    pub(crate) fn runtime(&self) -> Option<Handle> {
        Handle::try_current().ok().or_else(|| self.handle.clone())
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub(crate) fn next_id(&mut self) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        id
    }

    pub(crate) fn insert(&mut self, id: TimerId, task: AbortHandle) {
        self.pending.insert(id, task);
    }

    /// Called by a timer task once its delay elapsed. Returns false if the
    /// timer was cancelled in the meantime.
    pub(crate) fn complete(&mut self, id: TimerId) -> bool {
        self.pending.remove(&id).is_some()
    }

    pub(crate) fn cancel(&mut self, id: TimerId) {
        if let Some(task) = self.pending.remove(&id) {
            task.abort();
        }
    }

    /// Abort every pending timer and refuse new ones.
    pub(crate) fn dispose(&mut self) -> usize {
        self.disposed = true;
        let count = self.pending.len();
        for (_, task) in self.pending.drain() {
            task.abort();
        }
        count
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
