//! Memory provider seam
//!
//! The runtime never calls the system allocator for control blocks or
//! stacks; it goes through a `MemoryProvider`. The default provider in
//! `uthread-runtime` maps anonymous pages. Tests substitute providers that
//! count or fail allocations.

use core::ptr::NonNull;

use crate::error::MemoryError;

/// Source of page-granular memory for control blocks and stacks
///
/// # Safety
///
/// Implementors must return regions that are readable, writable,
/// zero-filled, aligned to at least `PAGE_SIZE` and at least `size` bytes
/// long, and that stay valid until passed back to `release`.
///
/// Both methods may be called from a worker thread with preemption
/// signals masked; they must not call back into the runtime.
pub unsafe trait MemoryProvider: Send + Sync {
    /// Obtain a fresh region of `size` bytes
    fn allocate(&self, size: usize) -> Result<NonNull<u8>, MemoryError>;

    /// Return a region obtained from `allocate` with the same `size`
    ///
    /// # Safety
    ///
    /// `ptr` must come from `allocate(size)` on this provider and must not
    /// be used afterwards.
    unsafe fn release(&self, ptr: NonNull<u8>, size: usize) -> Result<(), MemoryError>;

    /// Short name for diagnostics
    fn name(&self) -> &'static str {
        "custom"
    }
}
