//! `atomic-tailq`: a portable, mostly-lock-free concurrent FIFO tail queue
//! built on an atomic-cell abstraction, with a pluggable backend that falls
//! back to a recursive mutex on targets without native word-sized atomics.
//!
//! Two pieces compose the public surface:
//!
//! - [`atomic_cell::AtomicCell`] — a linearizable atomic integer, usable on
//!   its own, and the building block this crate's queues use for their
//!   element counters.
//! - [`tailq`] — the queues themselves: [`tailq::TailQueue`] (pointer-based,
//!   the primary representation) and [`tailq::RingTailQueue`] (a circular
//!   preallocated ring with an enqueue-time transform hook).
//!
//! [`group::Group`] lets several cells (or a queue's counters) be paired so
//! a caller can bundle their updates into one atomic-looking step; see its
//! module docs.
//!
//! Backend selection (`std::sync::atomic` vs. a `parking_lot`-backed mutex
//! fallback) is handled once, in [`backend`], and is otherwise invisible to
//! callers — see [`backend::backend_name`] if you need to confirm which one
//! a build picked.

pub mod atomic_cell;
pub mod backend;
pub mod group;
pub mod tailq;

pub use atomic_cell::AtomicCell;
pub use group::Group;
pub use tailq::{RingTailQueue, TailQueue, TailQueueError, TailQueueResult};
