//! Instead of every [`AtomicCell`](crate::atomic_cell::AtomicCell) or
//! [`TailQueue`](crate::tailq::linked::TailQueue) privately owning a mutex it
//! shares on request, a [`Group`] is the explicit collaborator that owns one
//! recursive mutex and hands out compound-update atomicity to whoever was
//! built against it. A cell or queue created via `paired_init` still performs
//! its individual operations lock-free; only [`Group::atomically`] acquires
//! the lock, which is what lets several cells (or a queue and its counters)
//! be updated as one unit.

use parking_lot::ReentrantMutex;
use std::sync::Arc;

/// A shared recursive mutex that one or more atomic cells / tail queues can
/// be paired with, so a caller can group several of their operations into a
/// single atomic-looking update.
///
/// Cloning a `Group` is cheap (it's a handle around an `Arc`); clones share
/// the same underlying lock.
#[derive(Clone)]
pub struct Group {
    lock: Arc<ReentrantMutex<()>>,
}

impl Group {
    /// Create a new, unshared group.
    pub fn new() -> Self {
        Group {
            lock: Arc::new(ReentrantMutex::new(())),
        }
    }

    /// Run `f` with the group's mutex held. Because the mutex is recursive,
    /// `f` may itself call `atomically` again (or call an operation on a
    /// cell/queue paired with this same group) without deadlocking.
    pub fn atomically<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.lock.lock();
        f()
    }
}

impl Default for Group {
    fn default() -> Self {
        Group::new()
    }
}
