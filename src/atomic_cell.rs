//! `AtomicCell`: a wrapper around a signed machine-word integer offering
//! linearizable `load`/`store`/`add`/`sub`/`increment`/`decrement`, with the
//! ordering contract fixed once (load is acquire, store is release, the
//! read-modify-write ops are acq-rel) and the backend choice pulled out into
//! [`crate::backend`] rather than repeated per-operation.

use crate::backend::Storage;
use crate::group::Group;
use log::trace;

/// A linearizable atomic integer cell.
///
/// Every operation here is individually linearizable regardless of how the
/// cell was constructed. Pairing a cell with a [`Group`] (via
/// [`AtomicCell::paired`]) does not change that — it only lets a caller use
/// the same group's [`Group::atomically`] to bundle several cells' updates
/// into one caller-visible atomic step (see the module docs on
/// [`crate::group`]).
pub struct AtomicCell {
    storage: Storage,
    group: Option<Group>,
}

impl AtomicCell {
    /// Initialize a cell holding 0.
    pub fn new() -> Self {
        trace!("atomic_cell::new backend={}", crate::backend::backend_name());
        AtomicCell {
            storage: Storage::new(0),
            group: None,
        }
    }

    /// Initialize a cell holding 0, sharing `group`'s recursive mutex with
    /// whatever else was paired to it. The cell's own operations stay
    /// lock-free; only compound multi-cell updates go through
    /// `group.atomically`.
    pub fn paired(group: &Group) -> Self {
        trace!("atomic_cell::paired backend={}", crate::backend::backend_name());
        AtomicCell {
            storage: Storage::new(0),
            group: Some(group.clone()),
        }
    }

    /// The group this cell was paired with, if any.
    pub fn group(&self) -> Option<&Group> {
        self.group.as_ref()
    }

    /// Whether this cell shares a mutex with other cells (paired mode).
    pub fn is_paired(&self) -> bool {
        self.group.is_some()
    }

    /// Acquire ordering load.
    #[inline]
    pub fn load(&self) -> i64 {
        self.storage.load()
    }

    /// Release ordering store.
    #[inline]
    pub fn store(&self, value: i64) {
        self.storage.store(value)
    }

    /// Acq-rel fetch-add; returns the new value.
    #[inline]
    pub fn add(&self, x: i64) -> i64 {
        self.storage.add(x)
    }

    /// Acq-rel fetch-sub; returns the new value.
    #[inline]
    pub fn sub(&self, x: i64) -> i64 {
        self.storage.sub(x)
    }

    /// Acq-rel increment; returns the new value.
    #[inline]
    pub fn increment(&self) -> i64 {
        self.add(1)
    }

    /// Acq-rel decrement; returns the new value.
    #[inline]
    pub fn decrement(&self) -> i64 {
        self.sub(1)
    }

    /// Poison the cell to -1. Does not race-check; operating on a destroyed
    /// cell afterward is a caller bug this does not diagnose.
    pub fn destroy(&self) {
        trace!("atomic_cell::destroy");
        self.storage.store(-1);
    }
}

impl Default for AtomicCell {
    fn default() -> Self {
        AtomicCell::new()
    }
}

impl std::fmt::Debug for AtomicCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomicCell")
            .field("value", &self.load())
            .field("paired", &self.is_paired())
            .finish()
    }
}
