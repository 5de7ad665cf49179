//! Per-worker run queue
//!
//! A circular singly linked list threaded through `Gcb::next`, with a
//! permanent anchor. Any thread may insert, always directly after the
//! anchor, with a CAS on `anchor.next`. Only the owning worker unlinks.
//! Every link except `anchor.next` therefore has a single writer; unlinking
//! the anchor's direct successor uses a CAS because an inserter may be
//! racing on that same word.
//!
//! Walkers on other threads must hold a `Pin` on the worker so the idle
//! loop defers freeing what it unlinks.

use core::ptr::NonNull;
use std::sync::atomic::{fence, AtomicUsize, Ordering};

use crate::gcb::Gcb;

/// Insert `gcb` right after `anchor`
///
/// `gcb` must be fully initialised; the successful CAS publishes it.
pub fn enqueue(anchor: &Gcb, gcb: NonNull<Gcb>) {
    // Safety: the caller hands over a live, not yet linked block
    let node = unsafe { gcb.as_ref() };
    let mut head = anchor.next.load(Ordering::Acquire);
    loop {
        node.next.store(head, Ordering::Relaxed);
        match anchor
            .next
            .compare_exchange_weak(head, gcb.as_ptr(), Ordering::Release, Ordering::Acquire)
        {
            Ok(_) => return,
            Err(actual) => head = actual,
        }
    }
}

/// Unlink `victim` whose predecessor is `prev`
///
/// Returns false when `prev` is the anchor and an insert raced in ahead of
/// the victim; the victim is then still linked and the walk should restart.
///
/// # Safety
///
/// Owning worker only. `prev.next` must have been observed as `victim`.
pub unsafe fn unlink(anchor: &Gcb, prev: &Gcb, victim: &Gcb) -> bool {
    let succ = victim.next.load(Ordering::Acquire);
    let victim_ptr = victim as *const Gcb as *mut Gcb;
    if core::ptr::eq(prev, anchor) {
        prev.next
            .compare_exchange(victim_ptr, succ, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    } else {
        prev.next.store(succ, Ordering::Release);
        true
    }
}

/// Iterator over the non-anchor nodes of a queue, in list order
pub struct Iter<'a> {
    anchor: &'a Gcb,
    cur: *const Gcb,
}

/// Walk the queue starting after the anchor
///
/// # Safety
///
/// The caller must be the owning worker or hold a `Pin` for as long as the
/// iterator and the references it yields are used.
pub unsafe fn iter(anchor: &Gcb) -> Iter<'_> {
    Iter {
        anchor,
        cur: anchor.next.load(Ordering::Acquire),
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Gcb;

    fn next(&mut self) -> Option<&'a Gcb> {
        if core::ptr::eq(self.cur, self.anchor) {
            return None;
        }
        // Safety: linked nodes are live while the walker is pinned
        let node = unsafe { &*self.cur };
        self.cur = node.next.load(Ordering::Acquire);
        Some(node)
    }
}

/// Keeps a worker's idle loop from freeing unlinked blocks
pub struct Pin<'a> {
    readers: &'a AtomicUsize,
}

impl<'a> Pin<'a> {
    pub fn new(readers: &'a AtomicUsize) -> Self {
        readers.fetch_add(1, Ordering::SeqCst);
        // Pairs with the fence in the idle loop before it checks `readers`
        fence(Ordering::SeqCst);
        Pin { readers }
    }
}

impl Drop for Pin<'_> {
    fn drop(&mut self) {
        self.readers.fetch_sub(1, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::DEFAULT_PROVIDER;
    use std::sync::Arc;
    use std::thread;
    use uthread_core::UThreadId;

    fn zero(_: usize) -> usize {
        0
    }

    fn node(id: u64) -> NonNull<Gcb> {
        Gcb::new_uthread(&DEFAULT_PROVIDER, UThreadId::new(id), 0, zero, 0, None, 64 * 1024).unwrap()
    }

    fn ids(anchor: &Gcb) -> Vec<u64> {
        unsafe { iter(anchor) }.map(|g| g.id().as_u64()).collect()
    }

    fn free_all(anchor: NonNull<Gcb>) {
        let a = unsafe { anchor.as_ref() };
        let nodes: Vec<_> = unsafe { iter(a) }.map(NonNull::from).collect();
        for n in nodes {
            unsafe { Gcb::free(n, &DEFAULT_PROVIDER).unwrap() };
        }
        unsafe { Gcb::free(anchor, &DEFAULT_PROVIDER).unwrap() };
    }

    #[test]
    fn test_insert_after_anchor() {
        let anchor = Gcb::new_anchor(&DEFAULT_PROVIDER, 0).unwrap();
        let a = unsafe { anchor.as_ref() };
        assert!(ids(a).is_empty());

        for id in 1..=3 {
            enqueue(a, node(id));
        }
        assert_eq!(ids(a), vec![3, 2, 1]);
        free_all(anchor);
    }

    #[test]
    fn test_unlink_head_and_middle() {
        let anchor = Gcb::new_anchor(&DEFAULT_PROVIDER, 0).unwrap();
        let a = unsafe { anchor.as_ref() };
        let n1 = node(1);
        let n2 = node(2);
        let n3 = node(3);
        enqueue(a, n1);
        enqueue(a, n2);
        enqueue(a, n3);

        // middle: 3 -> [2] -> 1
        unsafe {
            assert!(unlink(a, n3.as_ref(), n2.as_ref()));
            Gcb::free(n2, &DEFAULT_PROVIDER).unwrap();
        }
        assert_eq!(ids(a), vec![3, 1]);

        // head, after a racing insert moved it off the anchor
        enqueue(a, node(4));
        unsafe { assert!(!unlink(a, a, n3.as_ref())) };
        assert_eq!(ids(a), vec![4, 3, 1]);

        let n4 = NonNull::new(a.next.load(Ordering::Acquire)).unwrap();
        unsafe {
            assert!(unlink(a, a, n4.as_ref()));
            Gcb::free(n4, &DEFAULT_PROVIDER).unwrap();
        }
        assert_eq!(ids(a), vec![3, 1]);
        free_all(anchor);
    }

    #[test]
    fn test_concurrent_enqueue_loses_nothing() {
        struct SendPtr(NonNull<Gcb>);
        unsafe impl Send for SendPtr {}
        unsafe impl Sync for SendPtr {}

        let anchor = Arc::new(SendPtr(Gcb::new_anchor(&DEFAULT_PROVIDER, 0).unwrap()));
        let handles: Vec<_> = (0..8u64)
            .map(|t| {
                let anchor = Arc::clone(&anchor);
                thread::spawn(move || {
                    let a = unsafe { anchor.0.as_ref() };
                    for i in 0..50 {
                        enqueue(a, node(1 + t * 50 + i));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let a = unsafe { anchor.0.as_ref() };
        let mut seen = ids(a);
        seen.sort_unstable();
        assert_eq!(seen, (1..=400).collect::<Vec<_>>());
        free_all(anchor.0);
    }

    #[test]
    fn test_pin_counts() {
        let readers = AtomicUsize::new(0);
        {
            let _a = Pin::new(&readers);
            let _b = Pin::new(&readers);
            assert_eq!(readers.load(Ordering::SeqCst), 2);
        }
        assert_eq!(readers.load(Ordering::SeqCst), 0);
    }
}
