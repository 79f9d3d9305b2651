//! A busy-waiting lock for the devices the monitor shares with the kernel.
//!
//! The guard of a [`SpinLock`] has to be given back with
//! [`SpinLockGuard::unlock`]. A guard that goes out of scope while still
//! holding the lock panics and names the place that took it, so a lock that
//! would otherwise stay held forever is caught where it was leaked.
//!
//! ```
//! use abyss::spinlock::SpinLock;
//!
//! static HITS: SpinLock<u32> = SpinLock::new(0);
//!
//! let mut hits = HITS.lock();
//! *hits += 1;
//! hits.unlock();
//! ```

use core::{
    cell::UnsafeCell,
    marker::PhantomData,
    ops::{Deref, DerefMut},
    panic::Location,
    sync::atomic::{AtomicBool, Ordering},
};

/// Returned by [`SpinLock::try_lock`] when somebody else holds the lock.
#[derive(Debug, PartialEq, Eq)]
pub struct WouldBlock;

/// A value behind a spinning lock.
pub struct SpinLock<T> {
    held: AtomicBool,
    value: UnsafeCell<T>,
}

unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    /// An unlocked lock around `value`.
    pub const fn new(value: T) -> Self {
        Self {
            held: AtomicBool::new(false),
            value: UnsafeCell::new(value),
        }
    }

    /// Takes the lock, spinning while it is held.
    #[track_caller]
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        loop {
            if let Ok(guard) = self.try_lock() {
                return guard;
            }
            while self.held.load(Ordering::Relaxed) {
                core::hint::spin_loop();
            }
        }
    }

    /// Takes the lock if nobody holds it.
    #[track_caller]
    pub fn try_lock(&self) -> Result<SpinLockGuard<'_, T>, WouldBlock> {
        self.held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .map(|_| SpinLockGuard {
                lock: self,
                taken_at: Location::caller(),
                _local: PhantomData,
            })
            .map_err(|_| WouldBlock)
    }
}

/// Access to the value of a held [`SpinLock`].
pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
    taken_at: &'static Location<'static>,
    // The lock must be released on the context that took it.
    _local: PhantomData<*const ()>,
}

impl<T> SpinLockGuard<'_, T> {
    /// Releases the lock.
    pub fn unlock(self) {
        self.lock.held.store(false, Ordering::Release);
        core::mem::forget(self);
    }
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        panic!("SpinLockGuard taken at {} was dropped without unlock()", self.taken_at);
    }
}
