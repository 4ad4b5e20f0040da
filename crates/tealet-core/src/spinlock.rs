//! Tiny spinlock for tealet bookkeeping
//!
//! Guards the few fields that may be touched from a thread other than a
//! tealet's owner: the user data slot, the recorded frame and the greenlet
//! links. Critical sections are a few loads and stores and never switch.

use core::cell::UnsafeCell;
use core::fmt;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

/// Test-and-test-and-set lock around a `T`
///
/// A guard must not be held across a switch: the tealet holding it might
/// never be resumed.
pub struct SpinLock<T> {
    held: AtomicBool,
    value: UnsafeCell<T>,
}

// Safety: access to `value` is serialized by `held`
unsafe impl<T: Send> Send for SpinLock<T> {}
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub const fn new(value: T) -> Self {
        SpinLock {
            held: AtomicBool::new(false),
            value: UnsafeCell::new(value),
        }
    }

    #[inline]
    fn acquire(&self) -> bool {
        !self.held.swap(true, Ordering::Acquire)
    }

    /// Spin until the lock is ours
    #[inline]
    pub fn lock(&self) -> SpinGuard<'_, T> {
        let mut backoff = 1u32;
        while !self.acquire() {
            while self.held.load(Ordering::Relaxed) {
                for _ in 0..backoff {
                    core::hint::spin_loop();
                }
                backoff = (backoff << 1).min(64);
            }
        }
        SpinGuard { lock: self }
    }

    #[inline]
    pub fn try_lock(&self) -> Option<SpinGuard<'_, T>> {
        self.acquire().then(|| SpinGuard { lock: self })
    }

    /// Run `f` under the lock
    #[inline]
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.lock())
    }

    /// Swap in `value`; the old value is returned so it is dropped unlocked
    #[inline]
    pub fn replace(&self, value: T) -> T {
        self.with(|slot| core::mem::replace(slot, value))
    }

    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<T: Clone> SpinLock<T> {
    #[inline]
    pub fn get_cloned(&self) -> T {
        self.with(|v| v.clone())
    }
}

impl<T: Default> Default for SpinLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> fmt::Debug for SpinLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpinLock")
            .field("held", &self.held.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

pub struct SpinGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<T> Deref for SpinGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // Safety: the guard proves exclusive access
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> DerefMut for SpinGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        // Safety: the guard proves exclusive access
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T> Drop for SpinGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        self.lock.held.store(false, Ordering::Release);
    }
}
