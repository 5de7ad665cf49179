//! Worker threads
//!
//! A worker is one OS thread bound to one run queue. Its own thread stack
//! is the anchor context: whenever no uthread on the queue is runnable the
//! scheduler switches back to it, and it spends that time reclaiming
//! finished control blocks.

use core::ptr::{self, NonNull};
use std::sync::atomic::{fence, AtomicBool, AtomicPtr, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use uthread_core::error::{SchedResult, WorkerError};
use uthread_core::traits::MemoryProvider;
use uthread_core::{kdebug, kerror, ktrace, kwarn};
use uthread_core::{kprint, UThreadId, UThreadState};

use crate::config::RuntimeConfig;
use crate::gcb::Gcb;
use crate::memory::{Stack, DEFAULT_PROVIDER};
use crate::queue::{self, Pin};
use crate::signal::{self, PreemptGuard};
use crate::tls;

/// Startup handshake between workers and the master thread
#[derive(Default)]
pub struct Startup {
    ready: AtomicUsize,
    failed: AtomicBool,
}

impl Startup {
    pub fn ready(&self) -> usize {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }
}

pub struct Worker {
    index: usize,
    anchor: NonNull<Gcb>,
    /// Context running on this worker. Only the worker's own thread
    /// (scheduler and cleanup path) writes it.
    cur: AtomicPtr<Gcb>,
    pthread: AtomicUsize,
    /// Foreign queue walkers currently pinned
    readers: AtomicUsize,
    altstack: Stack,
    cleanup_stack: Stack,
    provider: &'static dyn MemoryProvider,
    idle_sleep: Duration,
}

// Safety: shared fields are atomics; `anchor` and the stacks are owned
// memory whose contents follow the queue and signal-mask protocols
unsafe impl Send for Worker {}
unsafe impl Sync for Worker {}

impl Worker {
    /// Allocate the anchor and the two per-worker stacks
    ///
    /// Worker memory always comes from the mmap provider; `provider` serves
    /// the uthreads.
    pub fn new(index: usize, config: &RuntimeConfig, provider: &'static dyn MemoryProvider) -> SchedResult<Self> {
        let anchor = Gcb::new_anchor(&DEFAULT_PROVIDER, index)?;
        let altstack = Stack::allocate(&DEFAULT_PROVIDER, config.altstack_size)?;
        let cleanup_stack = Stack::allocate(&DEFAULT_PROVIDER, config.cleanup_stack_size)?;

        Ok(Worker {
            index,
            anchor,
            cur: AtomicPtr::new(anchor.as_ptr()),
            pthread: AtomicUsize::new(0),
            readers: AtomicUsize::new(0),
            altstack,
            cleanup_stack,
            provider,
            idle_sleep: config.idle_sleep,
        })
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn anchor(&self) -> &Gcb {
        // Safety: anchors are never freed
        unsafe { self.anchor.as_ref() }
    }

    /// Context currently installed on this worker
    #[inline]
    pub fn current(&self) -> &Gcb {
        // Safety: `cur` always points at a linked block or the anchor
        unsafe { &*self.cur.load(Ordering::Relaxed) }
    }

    #[inline]
    pub(crate) fn set_current(&self, gcb: &Gcb) {
        self.cur.store(gcb as *const Gcb as *mut Gcb, Ordering::Relaxed);
    }

    #[inline]
    pub fn pthread(&self) -> libc::pthread_t {
        self.pthread.load(Ordering::Acquire) as libc::pthread_t
    }

    #[inline]
    pub fn provider(&self) -> &'static dyn MemoryProvider {
        self.provider
    }

    /// Initial stack pointer for the exit path
    #[inline]
    pub fn cleanup_stack_top(&self) -> *mut u8 {
        self.cleanup_stack.top()
    }

    /// Hold off reclamation while walking this worker's queue from
    /// another context
    #[inline]
    pub fn pin(&self) -> Pin<'_> {
        Pin::new(&self.readers)
    }

    /// Look up a live uthread by id
    ///
    /// The returned reference is only valid while `_pin` is held, unless
    /// the caller has claimed the block's disposition.
    pub fn find<'p>(&'p self, id: UThreadId, _pin: &Pin<'p>) -> Option<&'p Gcb> {
        // Safety: pinned walk
        unsafe { queue::iter(self.anchor()) }.find(|g| g.id() == id)
    }

    /// Number of uthreads linked into this worker's queue
    pub fn queue_len(&self) -> usize {
        let _pin = self.pin();
        // Safety: pinned walk
        unsafe { queue::iter(self.anchor()) }.count()
    }

    /// Start the OS thread for a leaked worker
    pub fn spawn(&'static self, startup: Arc<Startup>) -> SchedResult<()> {
        thread::Builder::new()
            .name(format!("uthread-worker-{}", self.index))
            .spawn(move || self.thread_main(&startup))
            .map(|_| ())
            .map_err(|_| WorkerError::SpawnFailed.into())
    }

    fn thread_main(&'static self, startup: &Startup) {
        tls::set_current_worker(self);
        kprint::set_worker_id(self.index);
        kprint::set_uthread_id(UThreadId::ANCHOR.as_u64());
        self.pthread.store(signal::current_pthread() as usize, Ordering::Release);

        let setup = signal::install_altstack(&self.altstack).and_then(|_| signal::configure_worker_mask());
        if let Err(e) = setup {
            kerror!("worker {} setup failed: {}", self.index, e);
            startup.failed.store(true, Ordering::Release);
            return;
        }

        startup.ready.fetch_add(1, Ordering::SeqCst);
        kdebug!("worker online");
        self.idle_loop()
    }

    /// The anchor context: reclaim, then yield or sleep
    fn idle_loop(&self) -> ! {
        let anchor = self.anchor();
        let mut retired: *mut Gcb = ptr::null_mut();

        loop {
            let mut runnable = false;
            let mut prev = anchor;
            let mut p = anchor.next.load(Ordering::Acquire);

            while !ptr::eq(p, anchor) {
                // Safety: only this loop frees, and only what it unlinked
                let node = unsafe { &*p };
                let next = node.next.load(Ordering::Acquire);

                if node.is_reclaimable() {
                    // Safety: we are the owning worker and prev.next == node
                    if !unsafe { queue::unlink(anchor, prev, node) } {
                        // An insert landed in front; rescan soon
                        runnable = true;
                        break;
                    }
                    node.retired_next.set(retired);
                    retired = p;
                    ktrace!("unlinked uthread {}", node.id());
                } else {
                    if node.state() == UThreadState::Sleeping {
                        runnable = true;
                    }
                    prev = node;
                }
                p = next;
            }

            // Pairs with the fence in Pin::new
            fence(Ordering::SeqCst);
            if !retired.is_null() && self.readers.load(Ordering::SeqCst) == 0 {
                self.free_retired(retired);
                retired = ptr::null_mut();
            }

            if runnable {
                signal::raise_preempt();
            } else {
                thread::sleep(self.idle_sleep);
            }
        }
    }

    fn free_retired(&self, mut head: *mut Gcb) {
        let _guard = PreemptGuard::new();
        while let Some(gcb) = NonNull::new(head) {
            // Safety: retired blocks are unlinked and no walker is pinned
            let (next, id) = unsafe { (gcb.as_ref().retired_next.get(), gcb.as_ref().id()) };
            if let Err(e) = unsafe { Gcb::free(gcb, self.provider) } {
                kwarn!("releasing uthread {}: {}", id, e);
            }
            head = next;
        }
    }
}
