//! A one-bit test-and-test-and-set spinlock.
//!
//! Exposed as a primitive in its own right (for very short critical
//! sections where a futex round trip would dominate the cost of the
//! section itself), and reused internally by the signal-emulation futex
//! backend to guard a wait-queue bucket. It must never be held across
//! anything that can block.

use core::sync::atomic::AtomicBool;

use crate::atomic::{ACQUIRE, RELAXED, RELEASE};

pub struct Spinlock {
    state: AtomicBool,
}

impl Spinlock {
    pub const fn new() -> Self {
        Spinlock {
            state: AtomicBool::new(false),
        }
    }

    /// Read-then-exchange: a relaxed load first, to avoid bouncing the cache
    /// line under contention when the lock is already held (test-and-test
    /// -and-set).
    pub fn try_lock(&self) -> bool {
        !self.state.load(RELAXED) && !self.state.swap(true, ACQUIRE)
    }

    pub fn lock(&self) {
        while !self.try_lock() {
            core::hint::spin_loop();
        }
    }

    pub fn unlock(&self) {
        self.state.store(false, RELEASE);
    }
}

impl Default for Spinlock {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: the lock itself provides the synchronization; the bool has no
// thread affinity.
unsafe impl Sync for Spinlock {}
