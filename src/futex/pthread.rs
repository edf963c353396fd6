//! Native pthreads pass-through backend: `Mutex<T>`/`Condvar` forward
//! directly to `libc::pthread_mutex_t`/`libc::pthread_cond_t`, bypassing the
//! futex/spinlock/SLEEPING-state machinery entirely. Selected with the
//! `pthread` Cargo feature as a sibling of the kernel and signal backends,
//! not as a `Futex` implementation underneath them.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};

pub struct Mutex<T> {
    raw: UnsafeCell<libc::pthread_mutex_t>,
    value: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for Mutex<T> {}
unsafe impl<T: Send> Sync for Mutex<T> {}

pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
}

unsafe impl<T: Sync> Sync for MutexGuard<'_, T> {}

impl<T> Mutex<T> {
    pub const fn new(value: T) -> Self {
        Mutex {
            raw: UnsafeCell::new(libc::PTHREAD_MUTEX_INITIALIZER),
            value: UnsafeCell::new(value),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        let r = unsafe { libc::pthread_mutex_lock(self.raw.get()) };
        debug_assert_eq!(r, 0);
        MutexGuard { mutex: self }
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        let r = unsafe { libc::pthread_mutex_trylock(self.raw.get()) };
        if r == 0 {
            Some(MutexGuard { mutex: self })
        } else {
            None
        }
    }
}

impl<T> Drop for Mutex<T> {
    fn drop(&mut self) {
        unsafe { libc::pthread_mutex_destroy(self.raw.get()) };
    }
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.mutex.value.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.value.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        let r = unsafe { libc::pthread_mutex_unlock(self.mutex.raw.get()) };
        debug_assert_eq!(r, 0);
    }
}

pub struct Condvar {
    raw: UnsafeCell<libc::pthread_cond_t>,
}

unsafe impl Send for Condvar {}
unsafe impl Sync for Condvar {}

impl Condvar {
    pub const fn new() -> Self {
        Condvar {
            raw: UnsafeCell::new(libc::PTHREAD_COND_INITIALIZER),
        }
    }

    pub fn wait<'a, T>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        let mutex = guard.mutex;
        let r =
            unsafe { libc::pthread_cond_wait(self.raw.get(), mutex.raw.get()) };
        debug_assert_eq!(r, 0);
        guard
    }

    /// `_mutex` is unused here (pthread condvars need no help keeping track
    /// of their mutex), but kept in the signature to match the futex-backed
    /// `Condvar`, whose broadcast path needs the mutex's wait address.
    pub fn notify_one<T>(&self, _mutex: &Mutex<T>) {
        let r = unsafe { libc::pthread_cond_signal(self.raw.get()) };
        debug_assert_eq!(r, 0);
    }

    pub fn notify_all<T>(&self, _mutex: &Mutex<T>) {
        let r = unsafe { libc::pthread_cond_broadcast(self.raw.get()) };
        debug_assert_eq!(r, 0);
    }
}

impl Drop for Condvar {
    fn drop(&mut self) {
        unsafe { libc::pthread_cond_destroy(self.raw.get()) };
    }
}
