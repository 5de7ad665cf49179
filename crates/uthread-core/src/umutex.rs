//! Spin mutex usable from uthread code
//!
//! A uthread holding a std `Mutex` can be preempted, and another uthread on
//! the same worker that then blocks on it parks the whole OS thread, so the
//! holder never runs again. `UMutex` never parks: a waiter spins until the
//! next preemption tick switches it out and lets the holder finish.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

/// Compare-and-swap spin mutex
pub struct UMutex<T> {
    locked: AtomicBool,
    data: UnsafeCell<T>,
}

// Safety: UMutex hands out exclusive access to T one guard at a time
unsafe impl<T: Send> Send for UMutex<T> {}
unsafe impl<T: Send> Sync for UMutex<T> {}

impl<T> UMutex<T> {
    #[inline]
    pub const fn new(value: T) -> Self {
        UMutex {
            locked: AtomicBool::new(false),
            data: UnsafeCell::new(value),
        }
    }

    /// Acquire the mutex, spinning until it is free
    #[inline]
    pub fn lock(&self) -> UMutexGuard<'_, T> {
        loop {
            if self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return UMutexGuard { mutex: self };
            }

            // Read-only spin so waiters don't bounce the cache line
            let mut spins = 0u32;
            while self.locked.load(Ordering::Relaxed) {
                spins = spins.saturating_add(1);
                for _ in 0..spins.min(64) {
                    core::hint::spin_loop();
                }
            }
        }
    }

    #[inline]
    pub fn try_lock(&self) -> Option<UMutexGuard<'_, T>> {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| UMutexGuard { mutex: self })
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    /// Mutable access through an exclusive borrow; no locking needed
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: Default> Default for UMutex<T> {
    fn default() -> Self {
        UMutex::new(T::default())
    }
}

/// Releases the mutex when dropped
pub struct UMutexGuard<'a, T> {
    mutex: &'a UMutex<T>,
}

impl<T> Deref for UMutexGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // Safety: the guard proves we hold the lock
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> DerefMut for UMutexGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        // Safety: the guard proves we hold the lock
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T> Drop for UMutexGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        self.mutex.locked.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_umutex_basic() {
        let m = UMutex::new(Vec::new());
        m.lock().push(1);
        m.lock().push(2);
        assert_eq!(*m.lock(), vec![1, 2]);
        assert!(!m.is_locked());
    }

    #[test]
    fn test_umutex_try_lock() {
        let m = UMutex::new(0u32);

        let guard = m.try_lock();
        assert!(guard.is_some());
        assert!(m.is_locked());
        assert!(m.try_lock().is_none());

        drop(guard);
        assert!(m.try_lock().is_some());
    }

    #[test]
    fn test_umutex_concurrent() {
        let m = Arc::new(UMutex::new(0u64));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let m = Arc::clone(&m);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        *m.lock() += 1;
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(*m.lock(), 4000);
    }

    #[test]
    fn test_umutex_into_inner() {
        let mut m = UMutex::new(String::from("a"));
        m.get_mut().push('b');
        assert_eq!(m.into_inner(), "ab");
    }
}
