//! Memory for uthread control blocks and stacks
//!
//! Everything the runtime maps goes through a `MemoryProvider`. The default
//! provider maps anonymous pages directly, so uthread creation never touches
//! the process heap.

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        pub use unix::*;
    } else {
        compile_error!("uthread-runtime needs a unix memory provider");
    }
}

use core::ptr::NonNull;

use uthread_core::error::MemoryError;
use uthread_core::traits::MemoryProvider;

/// Provider used when none is passed to `init_with_provider`
pub static DEFAULT_PROVIDER: MmapProvider = MmapProvider::new();

/// A stack region owned by one uthread or one worker
///
/// Not freed on drop: releasing needs the provider it came from, and a
/// uthread's stack is released by the uthread itself while running on the
/// worker's cleanup stack.
#[derive(Debug)]
pub struct Stack {
    base: NonNull<u8>,
    size: usize,
}

// Safety: a Stack is a plain owned memory range
unsafe impl Send for Stack {}
unsafe impl Sync for Stack {}

impl Stack {
    pub fn allocate(provider: &dyn MemoryProvider, size: usize) -> Result<Self, MemoryError> {
        let base = provider.allocate(size)?;
        Ok(Stack { base, size })
    }

    /// Lowest address of the region
    #[inline]
    pub fn base(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Highest 16-byte aligned address at or below the end of the region;
    /// stacks grow down from here
    #[inline]
    pub fn top(&self) -> *mut u8 {
        // Safety: base..base+size is the mapped region and base is page
        // aligned, so rounding down stays inside it
        let end = unsafe { self.base.as_ptr().add(self.size) };
        end.wrapping_sub(end as usize & 0xF)
    }

    /// Hand the region back
    ///
    /// # Safety
    ///
    /// `provider` must be the one that allocated it and nothing may still
    /// be executing on or pointing into it.
    pub unsafe fn release(self, provider: &dyn MemoryProvider) -> Result<(), MemoryError> {
        provider.release(self.base, self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uthread_core::constants::PAGE_SIZE;

    #[test]
    fn test_stack_bounds() {
        let stack = Stack::allocate(&DEFAULT_PROVIDER, 64 * 1024).unwrap();
        assert_eq!(stack.top() as usize - stack.base() as usize, 64 * 1024);
        assert_eq!(stack.base() as usize % PAGE_SIZE, 0);

        // Touch both ends
        unsafe {
            *stack.base() = 1;
            *stack.top().sub(1) = 2;
            stack.release(&DEFAULT_PROVIDER).unwrap();
        }
    }

    #[test]
    fn test_top_aligned_for_odd_sizes() {
        for size in [16 * 1024 + 8, 16 * 1024 + 1, 64 * 1024 - 4] {
            let stack = Stack::allocate(&DEFAULT_PROVIDER, size).unwrap();
            let top = stack.top() as usize;
            assert_eq!(top % 16, 0, "size {size}");
            assert!(top <= stack.base() as usize + size);
            assert!(top > stack.base() as usize + size - 16);
            unsafe { stack.release(&DEFAULT_PROVIDER).unwrap() };
        }
    }
}
