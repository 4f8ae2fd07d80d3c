//! Tail queue: a FIFO of opaque items, composed from [`AtomicCell`]s (for
//! the element count) and atomic pointer operations on the queue's own
//! head/tail links.
//!
//! Two representations are provided:
//!
//! - [`linked`] — a pointer-based Michael–Scott style queue built on
//!   `crossbeam::epoch`, with `insert_head`/`take`/`splice`. This is the
//!   primary representation.
//! - [`ring`] — a circular, preallocated node ring with an enqueue-time
//!   transform hook, documented here as the optional extension for callers
//!   who want item construction to happen atomically with publication into
//!   the queue.
//!
//! [`AtomicCell`]: crate::atomic_cell::AtomicCell

use thiserror::Error;

pub mod linked;
pub mod ring;

pub use linked::TailQueue;
pub use ring::RingTailQueue;

/// The one recoverable failure mode in this crate: node allocation failed.
/// Everything else — double-destroy, use after destroy, re-entrant
/// transform, racing iteration — is a caller contract violation the
/// implementation does not detect.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TailQueueError {
    /// A node could not be allocated. The queue is left unmodified.
    #[error("tail queue node allocation failed")]
    AllocationFailed,
}

pub type TailQueueResult<T> = Result<T, TailQueueError>;
