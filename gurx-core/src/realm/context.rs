//! Transaction Context
//!
//! Tracks which realms are currently draining transactions on this thread.
//! A publish made while its realm is already draining on the same thread is
//! re-entrant (a subscriber or projection publishing) and must be queued
//! rather than run recursively.
//!
//! # Implementation
//!
//! A thread-local stack of realm IDs. Entering a drain pushes the realm's
//! ID; the returned guard pops it when dropped, including during unwinding.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a realm instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RealmId(u64);

impl RealmId {
    /// Generate a new unique realm ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for RealmId {
    fn default() -> Self {
        Self::new()
    }
}

thread_local! {
    static DRAINING: RefCell<Vec<RealmId>> = const { RefCell::new(Vec::new()) };
}

/// Guard that marks a realm as draining on the current thread.
pub(crate) struct TransactionContext {
    realm: RealmId,
}

impl TransactionContext {
    /// Mark `realm` as draining until the guard is dropped.
    pub(crate) fn enter(realm: RealmId) -> Self {
        DRAINING.with(|stack| stack.borrow_mut().push(realm));
        Self { realm }
    }

    /// Whether `realm` is draining on the current thread.
    pub(crate) fn is_active(realm: RealmId) -> bool {
        DRAINING.with(|stack| stack.borrow().contains(&realm))
    }
}

impl Drop for TransactionContext {
    fn drop(&mut self) {
        DRAINING.with(|stack| {
            let popped = stack.borrow_mut().pop();
            debug_assert_eq!(
                popped,
                Some(self.realm),
                "TransactionContext mismatch"
            );
        });
    }
}
