//! Global allocator that is safe to use from preempted uthreads

use std::alloc::{GlobalAlloc, Layout, System};

use uthread_runtime::tls;
use uthread_runtime::PreemptGuard;

/// `System` with preemption masked around every call made on a worker
///
/// The system allocator takes internal locks. If a uthread were switched
/// out while holding one, the next uthread on that worker to allocate
/// would spin on a lock its own OS thread owns. Threads that are not
/// workers pay nothing beyond a TLS check.
pub struct PreemptSafeAlloc;

#[inline]
fn guard() -> Option<PreemptGuard> {
    tls::is_worker_thread().then(PreemptGuard::new)
}

unsafe impl GlobalAlloc for PreemptSafeAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let _g = guard();
        System.alloc(layout)
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let _g = guard();
        System.alloc_zeroed(layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        let _g = guard();
        System.dealloc(ptr, layout)
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let _g = guard();
        System.realloc(ptr, layout, new_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough_off_worker() {
        assert!(!tls::is_worker_thread());
        let layout = Layout::from_size_align(64, 16).unwrap();
        unsafe {
            let p = PreemptSafeAlloc.alloc_zeroed(layout);
            assert!(!p.is_null());
            assert!(std::slice::from_raw_parts(p, 64).iter().all(|&b| b == 0));
            let p = PreemptSafeAlloc.realloc(p, layout, 128);
            assert!(!p.is_null());
            PreemptSafeAlloc.dealloc(p, Layout::from_size_align(128, 16).unwrap());
        }
    }
}
