//! Anonymous-mapping memory provider

use core::ptr::{self, NonNull};

use uthread_core::constants::page_align;
use uthread_core::error::MemoryError;
use uthread_core::traits::MemoryProvider;

/// `MemoryProvider` backed by `mmap`/`munmap`
///
/// Mappings are private, anonymous and zero-filled. Sizes are rounded up to
/// whole pages. No guard page is placed below stacks.
#[derive(Debug, Default)]
pub struct MmapProvider {
    _private: (),
}

impl MmapProvider {
    pub const fn new() -> Self {
        MmapProvider { _private: () }
    }
}

// Safety: mmap returns zero-filled page-aligned RW memory that stays valid
// until munmap
unsafe impl MemoryProvider for MmapProvider {
    fn allocate(&self, size: usize) -> Result<NonNull<u8>, MemoryError> {
        if size == 0 || size > isize::MAX as usize / 2 {
            return Err(MemoryError::InvalidSize);
        }

        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                page_align(size),
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if addr == libc::MAP_FAILED {
            return Err(MemoryError::AllocationFailed);
        }

        NonNull::new(addr as *mut u8).ok_or(MemoryError::AllocationFailed)
    }

    unsafe fn release(&self, ptr: NonNull<u8>, size: usize) -> Result<(), MemoryError> {
        let ret = libc::munmap(ptr.as_ptr() as *mut libc::c_void, page_align(size));
        if ret != 0 {
            return Err(MemoryError::ReleaseFailed);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mmap"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mmap_zero_filled() {
        let p = MmapProvider::new();
        let region = p.allocate(10_000).unwrap();
        let bytes = unsafe { core::slice::from_raw_parts(region.as_ptr(), 10_000) };
        assert!(bytes.iter().all(|&b| b == 0));
        unsafe { p.release(region, 10_000).unwrap() };
    }

    #[test]
    fn test_mmap_rejects_zero() {
        assert_eq!(MmapProvider::new().allocate(0), Err(MemoryError::InvalidSize));
    }
}
