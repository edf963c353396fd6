//! A futex-backed mutex: three-state atomic word with a bounded spin phase
//! followed by futex-assisted sleep. See spec §4.5.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};

use crate::atomic::{ACQUIRE, RELAXED, RELEASE};
use crate::futex::{Futex, RawFutex};

const UNLOCKED: i32 = 0;
const LOCKED: i32 = 1;
pub(crate) const SLEEPING: i32 = 2;

const SPINS: u32 = 128;

/// A mutual-exclusion lock whose slow path sleeps on a futex rather than
/// spinning or making a blocking syscall through the host's pthreads
/// implementation.
pub struct Mutex<T> {
    pub(crate) state: RawFutex,
    value: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for Mutex<T> {}
unsafe impl<T: Send> Sync for Mutex<T> {}

pub struct MutexGuard<'a, T> {
    pub(crate) mutex: &'a Mutex<T>,
}

unsafe impl<T: Sync> Sync for MutexGuard<'_, T> {}

impl<T> Mutex<T> {
    pub const fn new(value: T) -> Self {
        Mutex {
            state: RawFutex::new(UNLOCKED),
            value: UnsafeCell::new(value),
        }
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        if self.state.value.load(RELAXED) != UNLOCKED {
            return None;
        }
        self.state
            .value
            .compare_exchange(UNLOCKED, LOCKED, ACQUIRE, RELAXED)
            .map(|_| MutexGuard { mutex: self })
            .ok()
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        let mut last_observed = UNLOCKED;
        let mut acquired = false;
        for _ in 0..SPINS {
            match self
                .state
                .value
                .compare_exchange_weak(UNLOCKED, LOCKED, ACQUIRE, RELAXED)
            {
                Ok(_) => {
                    acquired = true;
                    break;
                }
                Err(observed) => last_observed = observed,
            }
            core::hint::spin_loop();
        }

        if !acquired {
            // The SLEEPING marker is sticky and pessimistic: once a thread
            // has decided to sleep, every subsequent locker keeps the state
            // at SLEEPING so the unlocker knows a wake is owed. This costs
            // one extra wake on the falling edge but rules out lost-wakeup
            // races.
            let mut state = last_observed;
            if state != SLEEPING {
                state = self.state.value.swap(SLEEPING, ACQUIRE);
            }
            while state != UNLOCKED {
                self.state.futex_wait(SLEEPING);
                state = self.state.value.swap(SLEEPING, ACQUIRE);
            }
        }

        MutexGuard { mutex: self }
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
        let state = self.mutex.state.value.swap(UNLOCKED, RELEASE);
        if state == SLEEPING {
            self.mutex.state.futex_wake(1);
        }
    }
}

#[cfg(test)]
mod test {
    use super::Mutex;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn counter_four_threads_one_million_each() {
        const THREADS: usize = 4;
        const ITERS: usize = 1_000_000;

        let mutex = Arc::new(Mutex::new(0u64));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let mutex = Arc::clone(&mutex);
                thread::spawn(move || {
                    for _ in 0..ITERS {
                        *mutex.lock() += 1;
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*mutex.lock(), (THREADS * ITERS) as u64);
    }

    #[test]
    fn try_lock_fails_while_held() {
        let mutex = Mutex::new(0);
        let guard = mutex.lock();
        assert!(mutex.try_lock().is_none());
        drop(guard);
        assert!(mutex.try_lock().is_some());
    }

    #[test]
    fn no_lost_wakeup_under_contention() {
        // Many more waiters than can spin-win, forcing the SLEEPING path on
        // every thread but the first, and forcing the unlocker to wake them
        // one at a time. If a wakeup were ever lost this would hang.
        let mutex = Arc::new(Mutex::new(0u64));
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let mutex = Arc::clone(&mutex);
                thread::spawn(move || {
                    for _ in 0..10_000 {
                        *mutex.lock() += 1;
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*mutex.lock(), 32 * 10_000);
    }
}
