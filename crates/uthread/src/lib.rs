//! # uthread - preemptive green threads
//!
//! Runs many lightweight uthreads on a fixed pool of worker OS threads
//! (one per core by default). Uthreads never have to yield: a periodic
//! timer signal makes each worker switch to the next runnable uthread in
//! its queue, straight from the signal handler.
//!
//! ## Quick Start
//!
//! ```ignore
//! use uthread::{spawn, PreemptSafeAlloc};
//!
//! #[global_allocator]
//! static ALLOC: PreemptSafeAlloc = PreemptSafeAlloc;
//!
//! fn main() {
//!     let handles: Vec<_> = (0..10u64)
//!         .map(|i| spawn(move || i * i).unwrap())
//!         .collect();
//!     let total: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
//!     assert_eq!(total, 285);
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//!   create/spawn (any thread)                    ITIMER_REAL
//!          │ CAS after anchor                         │ SIGALRM
//!          ▼                                          ▼
//!   ┌──────────────┐  ┌──────────────┐        ┌──────────────┐
//!   │  worker 0    │  │  worker 1    │  ...   │   master     │
//!   │ anchor→A→B→┐ │  │ anchor→C→──┐ │◄───────│ SIGUSR1 to   │
//!   │  ▲─────────┘ │  │  ▲─────────┘ │        │ every worker │
//!   └──────────────┘  └──────────────┘        └──────────────┘
//! ```
//!
//! ## Running code inside uthreads
//!
//! A uthread can be switched out between any two instructions, including
//! while it holds a lock that another uthread on the same worker then
//! wants. Locks that park the OS thread deadlock the whole worker. So:
//!
//! - install `PreemptSafeAlloc` as the global allocator in any program
//!   whose uthreads allocate (the typed `spawn` layer does)
//! - use `UMutex` rather than `std::sync::Mutex` between uthreads
//! - print with `kprintln!` rather than `println!`; std's stdout lock is
//!   re-entrant per OS thread and two uthreads on one worker would share it
//! - a blocking syscall blocks every uthread on that worker

mod alloc;

use core::marker::PhantomData;

// Re-export core types
pub use uthread_core::{
    ConfigError, Disposition, MemoryError, MemoryProvider, SchedError, SchedResult, UMutex, UMutexGuard,
    UThreadId, UThreadState, WorkerError,
};

// Re-export kprint macros for debug logging
pub use uthread_core::kprint::{init as init_logging, set_log_level, set_time_enabled, LogLevel};
pub use uthread_core::{kdebug, kerror, kinfo, kprint, kprintln, ktrace, kwarn};

// Re-export env utilities
pub use uthread_core::{env_get, env_get_bool, env_get_opt, env_get_str};

// Re-export runtime API
pub use uthread_runtime::{
    create, current_id, detach, init, init_with_provider, is_in_uthread, join, queue_len, worker_count,
    EntryFn, MmapProvider, PreemptGuard, RuntimeConfig, UThread,
};

pub use alloc::PreemptSafeAlloc;

/// Owned handle to a uthread started by `spawn`
///
/// Dropping the handle without joining detaches the uthread; its result is
/// dropped when it finishes.
#[must_use = "dropping a JoinHandle detaches the uthread"]
pub struct JoinHandle<T> {
    raw: Option<UThread>,
    _result: PhantomData<T>,
}

impl<T> JoinHandle<T> {
    pub fn id(&self) -> UThreadId {
        self.raw().id()
    }

    /// Index of the worker the uthread runs on
    pub fn worker(&self) -> usize {
        self.raw().worker()
    }

    fn raw(&self) -> UThread {
        match self.raw {
            Some(raw) => raw,
            // Only join/detach take it, and they consume self
            None => unreachable!("JoinHandle used after join"),
        }
    }

    /// Wait for the uthread and take its result
    ///
    /// A panic inside the uthread comes back as `UThreadPanicked`.
    pub fn join(mut self) -> SchedResult<T> {
        let raw = self.raw.take().ok_or(SchedError::AlreadyJoined)?;
        let ret = uthread_runtime::join(raw)?;
        // Safety: a successful join hands back the pointer made by
        // run_closure::<_, T>, exactly once
        Ok(*unsafe { Box::from_raw(ret as *mut T) })
    }

    /// Let the uthread run to completion unobserved
    pub fn detach(mut self) -> SchedResult<()> {
        let raw = self.raw.take().ok_or(SchedError::Detached)?;
        uthread_runtime::detach(raw)
    }
}

impl<T> Drop for JoinHandle<T> {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            let _ = uthread_runtime::detach(raw);
        }
    }
}

impl<T> core::fmt::Debug for JoinHandle<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("JoinHandle").field("raw", &self.raw).finish()
    }
}

fn run_closure<F, T>(arg: usize) -> usize
where
    F: FnOnce() -> T,
{
    // Safety: `arg` is the Box<F> leaked by spawn, consumed once here
    let f = unsafe { Box::from_raw(arg as *mut F) };
    Box::into_raw(Box::new(f())) as usize
}

unsafe fn drop_result<T>(ret: usize) {
    drop(Box::from_raw(ret as *mut T));
}

/// Run `f` on a uthread
///
/// The closure and its result are boxed, so the program should use
/// `PreemptSafeAlloc`.
pub fn spawn<F, T>(f: F) -> SchedResult<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let arg = Box::into_raw(Box::new(f)) as usize;
    match uthread_runtime::create_with_drop(run_closure::<F, T>, arg, drop_result::<T>) {
        Ok(raw) => Ok(JoinHandle {
            raw: Some(raw),
            _result: PhantomData,
        }),
        Err(e) => {
            // Safety: the uthread was never created, so the box is still ours
            drop(unsafe { Box::from_raw(arg as *mut F) });
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_boxed<F: FnOnce() -> T, T>(f: F) -> usize {
        run_closure::<F, T>(Box::into_raw(Box::new(f)) as usize)
    }

    #[test]
    fn test_run_closure_boxes_result() {
        let ret = run_boxed(|| String::from("done"));
        let s = unsafe { Box::from_raw(ret as *mut String) };
        assert_eq!(*s, "done");
    }

    #[test]
    fn test_drop_result_runs_destructor() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        struct Flag(Arc<AtomicUsize>);
        impl Drop for Flag {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let hits = Arc::new(AtomicUsize::new(0));
        let ret = Box::into_raw(Box::new(Flag(hits.clone()))) as usize;
        unsafe { drop_result::<Flag>(ret) };
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
