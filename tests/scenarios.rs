//! Black-box scenario tests driven purely through the public crate API (the
//! way a downstream consumer would use it), complementing the
//! representation-internal tests colocated with `src/tailq/linked.rs` and
//! `src/tailq/ring.rs`.

use atomic_tailq::{RingTailQueue, TailQueue};

#[test]
fn s1_head_inserts_then_tail_appends() {
    let q: TailQueue<i32> = TailQueue::new().unwrap();
    for v in (1..=10).rev() {
        q.insert_head(v).unwrap();
    }
    for v in 21..=30 {
        q.enqueue(v).unwrap();
    }
    let expected: Vec<i32> = (1..=10).chain(21..=30).collect();
    assert_eq!(q.snapshot(), expected);
    assert_eq!(q.count(), 20);
}

#[test]
fn s2_mixed_inserts() {
    let q: TailQueue<i32> = TailQueue::new().unwrap();
    for v in 1..=10 {
        q.enqueue(v).unwrap();
    }
    for v in (21..=30).rev() {
        q.insert_head(v).unwrap();
    }
    let expected: Vec<i32> = (21..=30).chain(1..=10).collect();
    assert_eq!(q.snapshot(), expected);
    assert_eq!(q.count(), 20);
}

#[test]
fn s3_take_then_splice() {
    let q: TailQueue<i32> = TailQueue::new().unwrap();
    let q2: TailQueue<i32> = TailQueue::new().unwrap();

    for v in 21..=30 {
        q.enqueue(v).unwrap();
    }
    TailQueue::take(&q, &q2);
    assert!(q.is_empty());
    assert_eq!(q.count(), 0);
    assert_eq!(q2.snapshot(), (21..=30).collect::<Vec<_>>());
    assert_eq!(q2.count(), 10);

    for v in 1..=10 {
        q.enqueue(v).unwrap();
    }
    TailQueue::splice(&q, &q2);
    assert!(q2.is_empty());
    assert_eq!(q.snapshot(), (1..=10).chain(21..=30).collect::<Vec<_>>());

    for v in [31, 32, 33, 34] {
        q.enqueue(v).unwrap();
    }
    assert_eq!(
        q.snapshot(),
        (1..=10).chain(21..=30).chain(31..=34).collect::<Vec<_>>()
    );
}

#[test]
fn s5_transform_hook_sees_previous_value_exactly_once() {
    // f(prev, arg) receives the ring slot's actual previous occupant: None
    // the first time a slot is used, Some(old value) every time after.
    let q: RingTailQueue<i32> = RingTailQueue::new().unwrap();
    let args = [3, 7, 11, 2];
    let mut seen_prev = Vec::new();
    for &arg in &args {
        q.enqueue_with_transform(arg, |prev, arg| {
            seen_prev.push(prev);
            arg
        })
        .unwrap();
    }
    assert_eq!(seen_prev, vec![None, None, None, None]);
    let drained: Vec<_> = std::iter::from_fn(|| q.dequeue()).collect();
    assert_eq!(drained, args.to_vec());
}

#[test]
fn s6_destroy_without_freeing_leaves_caller_buffers_live() {
    let q: TailQueue<Box<i32>> = TailQueue::new().unwrap();
    let raw_ptrs: Vec<*mut i32> = (0..4).map(|v| Box::into_raw(Box::new(v))).collect();
    for &p in &raw_ptrs {
        q.enqueue(unsafe { Box::from_raw(p) }).unwrap();
    }
    q.destroy(false);
    for (i, &p) in raw_ptrs.iter().enumerate() {
        unsafe {
            assert_eq!(*p, i as i32);
            drop(Box::from_raw(p));
        }
    }
}

#[test]
fn s6_destroy_with_free_items_drops_contents_exactly_once() {
    use std::sync::Arc;

    let q: TailQueue<Arc<()>> = TailQueue::new().unwrap();
    let marker = Arc::new(());
    for _ in 0..6 {
        q.enqueue(Arc::clone(&marker)).unwrap();
    }
    assert_eq!(Arc::strong_count(&marker), 7);
    q.destroy(true);
    assert_eq!(Arc::strong_count(&marker), 1);
}

#[test]
fn splice_onto_nonempty_destination_keeps_its_own_items_first() {
    // splice(onto, from) == enqueueing from's items after onto's
    // pre-existing ones, then clearing from.
    let onto: TailQueue<i32> = TailQueue::new().unwrap();
    let from: TailQueue<i32> = TailQueue::new().unwrap();

    onto.enqueue(1).unwrap();
    onto.enqueue(2).unwrap();
    from.enqueue(10).unwrap();
    from.enqueue(11).unwrap();

    TailQueue::splice(&onto, &from);

    assert!(from.is_empty());
    assert_eq!(onto.snapshot(), vec![1, 2, 10, 11]);
}

#[test]
fn take_from_empty_source_leaves_destination_untouched() {
    let src: TailQueue<i32> = TailQueue::new().unwrap();
    let dst: TailQueue<i32> = TailQueue::new().unwrap();
    dst.enqueue(42).unwrap();

    TailQueue::take(&src, &dst);

    assert!(src.is_empty());
    assert_eq!(dst.snapshot(), vec![42]);
}
