//! Portability layer: a single boundary that picks the atomic mechanism at
//! build time and exposes a small fixed API (`new`/`load`/`store`/`add`/
//! `sub`) to the rest of the crate. Every other module is written once
//! against [`Storage`]; only this module contains the two backend bodies.
//!
//! Precedence:
//!
//! 1. standard atomics (`core::sync::atomic`), which on every tier-1/2 Rust
//!    target already resolve to the platform's native compare-and-swap
//!    instructions;
//! 2. a mutex-guarded fallback, used only when the target lacks word-sized
//!    atomics, or when `force-mutex-fallback` asks for it explicitly so the
//!    path stays exercisable in tests on every machine.

#[cfg(not(any(feature = "force-mutex-fallback", not(target_has_atomic = "64"))))]
mod imp {
    use std::sync::atomic::{AtomicI64, Ordering};

    pub(crate) const NAME: &str = "std-atomic";

    pub(crate) struct Storage(AtomicI64);

    impl Storage {
        #[inline]
        pub(crate) fn new(initial: i64) -> Self {
            Storage(AtomicI64::new(initial))
        }

        #[inline]
        pub(crate) fn load(&self) -> i64 {
            self.0.load(Ordering::Acquire)
        }

        #[inline]
        pub(crate) fn store(&self, value: i64) {
            self.0.store(value, Ordering::Release)
        }

        #[inline]
        pub(crate) fn add(&self, x: i64) -> i64 {
            self.0.fetch_add(x, Ordering::AcqRel).wrapping_add(x)
        }

        #[inline]
        pub(crate) fn sub(&self, x: i64) -> i64 {
            self.0.fetch_sub(x, Ordering::AcqRel).wrapping_sub(x)
        }
    }
}

#[cfg(any(feature = "force-mutex-fallback", not(target_has_atomic = "64")))]
mod imp {
    use std::cell::Cell;
    use parking_lot::ReentrantMutex;

    pub(crate) const NAME: &str = "mutex-fallback";

    // SAFETY-relevant note: ReentrantMutex hands out `&T`, never `&mut T` (a
    // thread may re-enter the lock), so the guarded value needs interior
    // mutability. `Cell<i64>` is `Send`, which is all `ReentrantMutex` needs.
    pub(crate) struct Storage(ReentrantMutex<Cell<i64>>);

    impl Storage {
        #[inline]
        pub(crate) fn new(initial: i64) -> Self {
            Storage(ReentrantMutex::new(Cell::new(initial)))
        }

        #[inline]
        pub(crate) fn load(&self) -> i64 {
            self.0.lock().get()
        }

        #[inline]
        pub(crate) fn store(&self, value: i64) {
            self.0.lock().set(value)
        }

        #[inline]
        pub(crate) fn add(&self, x: i64) -> i64 {
            let guard = self.0.lock();
            let v = guard.get().wrapping_add(x);
            guard.set(v);
            v
        }

        #[inline]
        pub(crate) fn sub(&self, x: i64) -> i64 {
            let guard = self.0.lock();
            let v = guard.get().wrapping_sub(x);
            guard.set(v);
            v
        }
    }
}

pub(crate) use imp::{Storage, NAME};

/// The backend this build selected. Opaque to callers beyond this string;
/// exposed only so `init`/`paired_init` can log it once.
pub fn backend_name() -> &'static str {
    NAME
}
