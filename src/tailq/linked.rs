//! A pointer-based tail queue, the primary representation this crate
//! implements: a Michael–Scott style lock-free FIFO over
//! `crossbeam::epoch`, extended with the splice-family operations
//! (`insert_head`, `take`, `splice`) a plain MS queue doesn't have.
//!
//! The node layout keeps a permanent sentinel ("dummy") node, exactly as the
//! classic Michael & Scott algorithm does — `head` never points anywhere
//! else for the lifetime of the queue. The first live item is `dummy.next`;
//! treating removal (`dequeue`) and prepend (`insert_head`) as competing CAS
//! attempts on that *one* atomic location is what keeps them from racing
//! each other into losing an item — a plain two-pointer (separate `head`
//! *and* `head.next`) scheme does not have that property.

use std::mem::MaybeUninit;
use std::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed};
use std::cell::UnsafeCell;

use crossbeam::epoch::{self, Atomic, Guard, Owned, Shared};
use crossbeam::utils::CachePadded;
use log::{debug, trace};

use crate::atomic_cell::AtomicCell;
use crate::group::Group;
use crate::tailq::TailQueueResult;

struct Node<T> {
    data: UnsafeCell<MaybeUninit<T>>,
    next: Atomic<Node<T>>,
}

impl<T> Node<T> {
    fn sentinel() -> Self {
        Node {
            data: UnsafeCell::new(MaybeUninit::uninit()),
            next: Atomic::null(),
        }
    }

    fn holding(item: T) -> Self {
        Node {
            data: UnsafeCell::new(MaybeUninit::new(item)),
            next: Atomic::null(),
        }
    }
}

/// A FIFO tail queue: producers [`enqueue`](TailQueue::enqueue) at the tail,
/// consumers [`dequeue`](TailQueue::dequeue) from the head. `enqueue` and
/// `dequeue` are lock-free on every backend; [`insert_head`](TailQueue::insert_head)
/// is lock-free too (it shares the same CAS location as `dequeue` by
/// design). [`take`](TailQueue::take) and [`splice`](TailQueue::splice) are
/// linearizable from their source's point of view only — see their docs.
pub struct TailQueue<T> {
    /// Permanent sentinel; never reassigned after `new`.
    head: CachePadded<Atomic<Node<T>>>,
    /// Points at the current last node (the sentinel, when empty).
    tail: CachePadded<Atomic<Node<T>>>,
    count: AtomicCell,
    group: Option<Group>,
}

unsafe impl<T: Send> Send for TailQueue<T> {}
unsafe impl<T: Send> Sync for TailQueue<T> {}

impl<T> TailQueue<T> {
    /// Prepare an empty queue. Count is 0.
    ///
    /// Returns `Result` because the sentinel node's allocation can in
    /// principle fail; in practice Rust's global allocator aborts on
    /// allocation failure rather than returning one, so this is `Ok` in
    /// every build that runs to this point at all. Kept `Result`-shaped for
    /// API parity with the fallible queue operations and so a future
    /// `try_reserve`-style allocator hook has somewhere to plug in.
    pub fn new() -> TailQueueResult<Self> {
        let guard = &epoch::pin();
        let sentinel = Owned::new(Node::sentinel()).into_shared(guard);
        let head = Atomic::null();
        head.store(sentinel, Relaxed);
        let tail = Atomic::null();
        tail.store(sentinel, Relaxed);
        debug!("tailq::new backend={}", crate::backend::backend_name());
        Ok(TailQueue {
            head: CachePadded::new(head),
            tail: CachePadded::new(tail),
            count: AtomicCell::new(),
            group: None,
        })
    }

    /// Prepare an empty queue whose element counter shares `group`'s
    /// recursive mutex with whatever else is paired to it.
    pub fn paired_init(group: &Group) -> TailQueueResult<Self> {
        let mut queue = Self::new()?;
        queue.count = AtomicCell::paired(group);
        queue.group = Some(group.clone());
        Ok(queue)
    }

    /// The group this queue was paired with, if any.
    pub fn group(&self) -> Option<&Group> {
        self.group.as_ref()
    }

    /// Current element count.
    #[inline]
    pub fn count(&self) -> i64 {
        self.count.load()
    }

    /// For this representation, every node is freed immediately on
    /// dequeue, so the allocated-node count and the element count always
    /// coincide quiescently; unlike the ring variant ([`super::ring`]) there
    /// is no separate growing pool to report.
    #[inline]
    pub fn allocated(&self) -> i64 {
        self.count()
    }

    /// `true` if the queue currently has no items.
    pub fn is_empty(&self) -> bool {
        let guard = &epoch::pin();
        self.first(guard).is_null()
    }

    #[inline]
    fn dummy<'g>(&self, guard: &'g Guard) -> Shared<'g, Node<T>> {
        self.head.load(Relaxed, guard)
    }

    #[inline]
    fn first<'g>(&self, guard: &'g Guard) -> Shared<'g, Node<T>> {
        unsafe { self.dummy(guard).deref() }.next.load(Acquire, guard)
    }

    /// Append `item` at the tail. Wait-free modulo a bounded number of CAS
    /// retries from concurrent producers racing on the same tail.
    pub fn enqueue(&self, item: T) -> TailQueueResult<()> {
        let guard = &epoch::pin();
        let mut new = Owned::new(Node::holding(item));
        loop {
            let tail = self.tail.load(Acquire, guard);
            let tail_ref = unsafe { tail.deref() };
            let next = tail_ref.next.load(Acquire, guard);

            if !next.is_null() {
                // Tail is lagging behind the true last node; help it catch
                // up before trying to append ourselves.
                let _ = self.tail.compare_exchange(tail, next, AcqRel, Relaxed, guard);
                trace!("tailq::enqueue helped tail forward");
                continue;
            }

            match tail_ref.next.compare_exchange(Shared::null(), new, AcqRel, Acquire, guard) {
                Ok(inserted) => {
                    let _ = self.tail.compare_exchange(tail, inserted, AcqRel, Relaxed, guard);
                    self.count.increment();
                    return Ok(());
                }
                Err(e) => {
                    new = e.new;
                    trace!("tailq::enqueue CAS retry");
                }
            }
        }
    }

    /// Remove and return the head item, or `None` if the queue was empty.
    /// Leaves the queue unchanged on empty.
    pub fn dequeue(&self) -> Option<T> {
        let guard = &epoch::pin();
        let dummy = self.dummy(guard);
        let dummy_ref = unsafe { dummy.deref() };

        loop {
            let first = dummy_ref.next.load(Acquire, guard);
            let first_ref = match unsafe { first.as_ref() } {
                None => return None,
                Some(r) => r,
            };
            let next = first_ref.next.load(Acquire, guard);

            match dummy_ref
                .next
                .compare_exchange(first, next, AcqRel, Acquire, guard)
            {
                Ok(_) => {
                    let tail = self.tail.load(Acquire, guard);
                    if next.is_null() && tail == first {
                        // We just removed the node tail pointed at and no
                        // producer has linked a successor yet; swing tail
                        // back to the sentinel so the next enqueue publishes
                        // through it again. If next is non-null, a producer
                        // already raced ahead and linked onto first — tail
                        // must be left alone (or already advanced) so it
                        // isn't swung back past that new node.
                        let _ = self.tail.compare_exchange(first, dummy, AcqRel, Relaxed, guard);
                    }
                    self.count.decrement();
                    let item = unsafe { (*first_ref.data.get()).assume_init_read() };
                    unsafe {
                        guard.defer_destroy(first);
                    }
                    return Some(item);
                }
                Err(_) => {
                    trace!("tailq::dequeue CAS retry");
                    continue;
                }
            }
        }
    }

    /// Prepend `item` at the head. CASes the same location `dequeue` does
    /// (`dummy.next`), so the two operations properly serialize against
    /// each other instead of racing: whichever wins sees its retry loop
    /// observe the other's effect.
    pub fn insert_head(&self, item: T) -> TailQueueResult<()> {
        let guard = &epoch::pin();
        let dummy = self.dummy(guard);
        let dummy_ref = unsafe { dummy.deref() };
        let mut new = Owned::new(Node::holding(item));

        loop {
            let first = dummy_ref.next.load(Acquire, guard);
            new.next.store(first, Relaxed);

            match dummy_ref
                .next
                .compare_exchange(first, new, AcqRel, Acquire, guard)
            {
                Ok(inserted) => {
                    if first.is_null() {
                        // Queue was empty: tail still points at the
                        // sentinel and must move to the node we just
                        // inserted.
                        let _ = self.tail.compare_exchange(dummy, inserted, AcqRel, Relaxed, guard);
                    }
                    self.count.increment();
                    return Ok(());
                }
                Err(e) => {
                    new = e.new;
                    trace!("tailq::insert_head CAS retry");
                }
            }
        }
    }

    /// Detach this queue's entire contents in one CAS (this is the queue's
    /// linearization point for `take`/`splice`), returning the detached
    /// chain's first and last node plus the element count moved.
    ///
    /// A concurrent producer that links a new node onto the old tail in the
    /// race window between our snapshot and the detaching CAS is walked
    /// past (see the loop below) on a best-effort basis; a producer that
    /// wins the race *after* our walk has already finished is a known,
    /// documented non-linearizable corner of `take`/`splice` this does not
    /// defend against further.
    fn detach_all<'g>(&self, guard: &'g Guard) -> (Shared<'g, Node<T>>, Shared<'g, Node<T>>, i64) {
        let dummy = self.dummy(guard);
        let dummy_ref = unsafe { dummy.deref() };

        let first = loop {
            let candidate = dummy_ref.next.load(Acquire, guard);
            match dummy_ref
                .next
                .compare_exchange(candidate, Shared::null(), AcqRel, Acquire, guard)
            {
                Ok(_) => break candidate,
                Err(_) => continue,
            }
        };

        let mut last = first;
        if !first.is_null() {
            loop {
                let next = unsafe { last.deref() }.next.load(Acquire, guard);
                if next.is_null() {
                    break;
                }
                last = next;
            }
        }

        let tail_snapshot = self.tail.load(Acquire, guard);
        let _ = self.tail.compare_exchange(tail_snapshot, dummy, AcqRel, Relaxed, guard);

        let moved = self.count.load().max(0);
        self.count.sub(moved);

        (first, last, moved)
    }

    /// Append an already-linked chain (`chain_head ..= chain_tail`) onto
    /// this queue's tail, using the same helping protocol as `enqueue`.
    fn append_chain<'g>(&self, chain_head: Shared<'g, Node<T>>, chain_tail: Shared<'g, Node<T>>, guard: &'g Guard) {
        if chain_head.is_null() {
            return;
        }

        loop {
            let tail = self.tail.load(Acquire, guard);
            let tail_ref = unsafe { tail.deref() };
            let next = tail_ref.next.load(Acquire, guard);

            if !next.is_null() {
                let _ = self.tail.compare_exchange(tail, next, AcqRel, Relaxed, guard);
                continue;
            }

            match tail_ref
                .next
                .compare_exchange(Shared::null(), chain_head, AcqRel, Acquire, guard)
            {
                Ok(_) => {
                    let _ = self.tail.compare_exchange(tail, chain_tail, AcqRel, Relaxed, guard);
                    return;
                }
                Err(_) => continue,
            }
        }
    }

    fn move_all(from: &Self, onto: &Self) {
        let guard = &epoch::pin();
        let (first, last, moved) = from.detach_all(guard);
        onto.append_chain(first, last, guard);
        onto.count.add(moved);
    }

    /// Atomically move `src`'s entire contents onto `dst`. `src` becomes
    /// empty; `dst`'s prior contents (if any — the common case is an empty
    /// `dst`) are kept and `src`'s chain is appended after them, so no
    /// concurrently-enqueued item on `dst` is lost even when `dst` was not
    /// actually empty.
    pub fn take(src: &Self, dst: &Self) {
        trace!("tailq::take");
        Self::move_all(src, dst)
    }

    /// Concatenate `from`'s contents onto `onto`'s tail; `from` becomes
    /// empty. Linearizable from `from`'s point of view; interleaving with
    /// concurrent producers on `onto` is best-effort, same as `take`.
    pub fn splice(onto: &Self, from: &Self) {
        trace!("tailq::splice");
        Self::move_all(from, onto)
    }

    /// Best-effort, non-linearizable snapshot of the current contents, head
    /// to tail. Used by tests to sanity-check `count`; never dereferences
    /// freed memory (nodes are only freed by `dequeue`, which this does not
    /// race with under the documented single-iterator-at-a-time usage).
    pub fn snapshot(&self) -> Vec<T>
    where
        T: Clone,
    {
        let guard = &epoch::pin();
        let mut cur = self.first(guard);
        let mut out = Vec::new();
        while let Some(node) = unsafe { cur.as_ref() } {
            let item = unsafe { (*node.data.get()).assume_init_ref().clone() };
            out.push(item);
            cur = node.next.load(Acquire, guard);
        }
        out
    }

    /// Remove and free every remaining node, dropping the contained items
    /// too if `free_items` is `true`; otherwise the items are left
    /// un-dropped (matching `MaybeUninit`'s own no-op drop), so the caller
    /// keeps sole ownership of whatever `T` was — e.g. a `T` that is itself
    /// a raw pointer the caller frees through other means.
    ///
    /// This consumes `self` by value, so the type system — not caller
    /// discipline — rules out any further use after destroy.
    ///
    /// # Safety contract
    /// No other thread may be concurrently operating on this queue. This
    /// crate does not detect that violation.
    pub fn destroy(mut self, free_items: bool) {
        self.destroy_in_place(free_items);
        std::mem::forget(self);
    }

    fn destroy_in_place(&mut self, free_items: bool) {
        debug!("tailq::destroy free_items={free_items}");
        unsafe {
            let guard = epoch::unprotected();
            let dummy = self.dummy(guard);
            let mut cur = dummy;
            loop {
                let next = cur.deref().next.load(Relaxed, guard);
                if cur != dummy && free_items {
                    (*cur.deref().data.get()).assume_init_drop();
                }
                drop(cur.into_owned());
                if next.is_null() {
                    break;
                }
                cur = next;
            }
        }
        self.count.destroy();
    }
}

impl<T> Drop for TailQueue<T> {
    fn drop(&mut self) {
        // Implicit drop behaves like `Vec<T>`: contained items are dropped
        // too. Call `destroy(false)` explicitly to keep them alive instead.
        self.destroy_in_place(true);
    }
}

impl<T> Default for TailQueue<T> {
    fn default() -> Self {
        Self::new().expect("allocation failure constructing an empty TailQueue")
    }
}

impl<T> std::fmt::Debug for TailQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TailQueue")
            .field("count", &self.count())
            .field("paired", &self.group.is_some())
            .finish()
    }
}
