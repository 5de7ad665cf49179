//! Thread-local storage for the worker context
//!
//! Each worker OS thread records which `Worker` it is. The scheduler reads
//! this inside the signal handler, so the slot is a const-initialised
//! `Cell` with no destructor and no lazy initialisation.

use core::ptr;
use std::cell::Cell;

use crate::worker::Worker;

thread_local! {
    static CURRENT_WORKER: Cell<*const Worker> = const { Cell::new(ptr::null()) };
}

/// Bind this OS thread to `worker`
#[inline]
pub fn set_current_worker(worker: &'static Worker) {
    CURRENT_WORKER.with(|cell| cell.set(worker));
}

/// The worker running on this OS thread, if any
#[inline]
pub fn current_worker() -> Option<&'static Worker> {
    let w = CURRENT_WORKER.with(|cell| cell.get());
    // Safety: workers are leaked at startup and never freed
    unsafe { w.as_ref() }
}

#[inline]
pub fn is_worker_thread() -> bool {
    current_worker().is_some()
}
