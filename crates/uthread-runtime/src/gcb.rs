//! Green-thread control block
//!
//! One `Gcb` per uthread plus one anchor per worker. Control blocks live in
//! memory from the runtime's `MemoryProvider` and are linked into a
//! worker's run queue through `next`. The run queue owns them from
//! insertion until the worker's idle loop unlinks and frees them.

use core::cell::{Cell, UnsafeCell};
use core::mem;
use core::ptr::{self, NonNull};
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU8, Ordering};

use uthread_core::constants::page_align;
use uthread_core::error::MemoryError;
use uthread_core::traits::MemoryProvider;
use uthread_core::{Disposition, UThreadId, UThreadState};

use crate::arch::MachineContext;
use crate::memory::Stack;

/// Signature of a uthread entry function
pub type EntryFn = fn(usize) -> usize;

/// Destructor for a result that nobody will join
pub type ResultDrop = unsafe fn(usize);

/// Bytes requested from the provider for one control block
pub const GCB_ALLOC_SIZE: usize = page_align(mem::size_of::<Gcb>());

fn anchor_entry(_: usize) -> usize {
    0
}

#[repr(C, align(64))]
pub struct Gcb {
    id: UThreadId,
    worker: usize,
    state: AtomicU8,
    disposition: AtomicU8,
    panicked: AtomicBool,

    entry: EntryFn,
    arg: usize,
    result_drop: Option<ResultDrop>,

    /// Written by the cleanup path before JOINABLE, read by join after
    ret: UnsafeCell<usize>,
    /// Released by the cleanup path; `None` afterwards
    stack: UnsafeCell<Option<Stack>>,
    /// errno at the moment this context was switched out
    errno: Cell<i32>,

    pub(crate) next: AtomicPtr<Gcb>,
    /// Link in the idle loop's retired list; only that loop touches it
    pub(crate) retired_next: Cell<*mut Gcb>,

    ctx: UnsafeCell<MachineContext>,
}

// Safety: fields without atomics are either immutable after construction
// or have a single writer ordered against readers by `state`
unsafe impl Send for Gcb {}
unsafe impl Sync for Gcb {}

impl Gcb {
    fn blank(id: UThreadId, worker: usize, state: UThreadState) -> Gcb {
        Gcb {
            id,
            worker,
            state: AtomicU8::new(state as u8),
            disposition: AtomicU8::new(Disposition::Attached as u8),
            panicked: AtomicBool::new(false),
            entry: anchor_entry,
            arg: 0,
            result_drop: None,
            ret: UnsafeCell::new(0),
            stack: UnsafeCell::new(None),
            errno: Cell::new(0),
            next: AtomicPtr::new(ptr::null_mut()),
            retired_next: Cell::new(ptr::null_mut()),
            ctx: UnsafeCell::new(MachineContext::new()),
        }
    }

    fn place(provider: &dyn MemoryProvider, gcb: Gcb) -> Result<NonNull<Gcb>, MemoryError> {
        let mem = provider.allocate(GCB_ALLOC_SIZE)?.cast::<Gcb>();
        // Safety: fresh page-aligned region of at least size_of::<Gcb>()
        unsafe { ptr::write(mem.as_ptr(), gcb) };
        Ok(mem)
    }

    /// Create a worker's anchor: RUNNING, linked to itself
    pub fn new_anchor(provider: &dyn MemoryProvider, worker: usize) -> Result<NonNull<Gcb>, MemoryError> {
        let anchor = Self::place(provider, Gcb::blank(UThreadId::ANCHOR, worker, UThreadState::Running))?;
        // Safety: just placed
        unsafe { anchor.as_ref().next.store(anchor.as_ptr(), Ordering::Relaxed) };
        Ok(anchor)
    }

    /// Create a SLEEPING uthread whose first switch-in calls `entry(arg)`
    ///
    /// On failure nothing stays allocated.
    pub fn new_uthread(
        provider: &dyn MemoryProvider,
        id: UThreadId,
        worker: usize,
        entry: EntryFn,
        arg: usize,
        result_drop: Option<ResultDrop>,
        stack_size: usize,
    ) -> Result<NonNull<Gcb>, MemoryError> {
        let stack = Stack::allocate(provider, stack_size)?;
        let top = stack.top();

        let mut blank = Gcb::blank(id, worker, UThreadState::Sleeping);
        blank.entry = entry;
        blank.arg = arg;
        blank.result_drop = result_drop;

        let gcb = match Self::place(provider, blank) {
            Ok(gcb) => gcb,
            Err(e) => {
                // Safety: never handed out
                let _ = unsafe { stack.release(provider) };
                return Err(e);
            }
        };

        // Safety: nobody else can see the block yet
        unsafe {
            let g = gcb.as_ref();
            *g.stack.get() = Some(stack);
            (*g.ctx.get()).prime(top, crate::scheduler::uthread_entry as usize, gcb.as_ptr() as usize);
        }
        Ok(gcb)
    }

    /// Run the pending result destructor, release any residual stack and
    /// return the block to the provider
    ///
    /// # Safety
    ///
    /// `gcb` must be unlinked, unreachable by any walker and never used
    /// again.
    pub unsafe fn free(gcb: NonNull<Gcb>, provider: &dyn MemoryProvider) -> Result<(), MemoryError> {
        let g = gcb.as_ref();
        if g.disposition().is_detached() && g.state() == UThreadState::Joinable && !g.panicked() {
            if let Some(drop_result) = g.result_drop {
                drop_result(*g.ret.get());
            }
        }
        let residual = (*g.stack.get()).take();
        ptr::drop_in_place(gcb.as_ptr());

        let stack_res = match residual {
            Some(stack) => stack.release(provider),
            None => Ok(()),
        };
        let gcb_res = provider.release(gcb.cast(), GCB_ALLOC_SIZE);
        stack_res.and(gcb_res)
    }

    #[inline]
    pub fn id(&self) -> UThreadId {
        self.id
    }

    #[inline]
    pub fn worker(&self) -> usize {
        self.worker
    }

    #[inline]
    pub fn is_anchor(&self) -> bool {
        self.id.is_anchor()
    }

    #[inline]
    pub fn entry(&self) -> (EntryFn, usize) {
        (self.entry, self.arg)
    }

    #[inline]
    pub fn state(&self) -> UThreadState {
        UThreadState::from(self.state.load(Ordering::Acquire))
    }

    /// Store a new state with Release ordering
    #[inline]
    pub fn set_state(&self, next: UThreadState) {
        debug_assert!(
            self.state().can_transition_to(next),
            "uthread {}: illegal transition {} -> {}",
            self.id,
            self.state(),
            next
        );
        self.state.store(next as u8, Ordering::Release);
    }

    #[inline]
    pub fn disposition(&self) -> Disposition {
        Disposition::from(self.disposition.load(Ordering::Acquire))
    }

    /// Move from ATTACHED to `target`; on failure returns the current
    /// disposition
    pub fn claim(&self, target: Disposition) -> Result<(), Disposition> {
        self.disposition
            .compare_exchange(
                Disposition::Attached as u8,
                target as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(Disposition::from)
    }

    /// JOINED, or JOINABLE with nobody left to join it
    #[inline]
    pub fn is_reclaimable(&self) -> bool {
        match self.state() {
            UThreadState::Joined => true,
            UThreadState::Joinable => self.disposition().is_detached(),
            _ => false,
        }
    }

    #[inline]
    pub fn panicked(&self) -> bool {
        self.panicked.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn mark_panicked(&self) {
        self.panicked.store(true, Ordering::Relaxed);
    }

    /// # Safety
    ///
    /// Only the cleanup path of this uthread may call this, before JOINABLE.
    #[inline]
    pub unsafe fn store_ret(&self, value: usize) {
        *self.ret.get() = value;
    }

    /// # Safety
    ///
    /// State must have been observed JOINABLE with Acquire.
    #[inline]
    pub unsafe fn load_ret(&self) -> usize {
        *self.ret.get()
    }

    /// # Safety
    ///
    /// Only the owning worker may call this, with preemption masked.
    #[inline]
    pub unsafe fn take_stack(&self) -> Option<Stack> {
        (*self.stack.get()).take()
    }

    /// # Safety
    ///
    /// Only the owning worker's scheduler may touch the context.
    #[inline]
    pub unsafe fn ctx(&self) -> *mut MachineContext {
        self.ctx.get()
    }

    #[inline]
    pub fn saved_errno(&self) -> i32 {
        self.errno.get()
    }

    #[inline]
    pub fn save_errno(&self, errno: i32) {
        self.errno.set(errno);
    }
}
