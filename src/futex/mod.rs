// Note on futexes:
//
// The kernel maintains a queue of threads waiting on the address of some
// atomic integer used as a futex. Because processes have a virtual address
// space, the pointer address does not match the hardware address of the
// atomic. This doesn't normally concern us as a userspace library, but it
// explains why a futex should be marked "private" whenever possible: a
// private futex only ever needs the virtual address, which lets the kernel
// skip a page-table walk and a system-wide futex table lookup.

use crate::atomic::{AtomicWord, Word};

#[cfg(all(
    any(target_os = "linux", target_os = "android"),
    not(feature = "force_signal_backend")
))]
mod kernel_linux;
#[cfg(all(
    any(target_os = "linux", target_os = "android"),
    not(feature = "force_signal_backend")
))]
use kernel_linux as backend;

#[cfg(all(target_os = "freebsd", not(feature = "force_signal_backend")))]
mod kernel_freebsd;
#[cfg(all(target_os = "freebsd", not(feature = "force_signal_backend")))]
use kernel_freebsd as backend;

#[cfg(any(
    feature = "force_signal_backend",
    not(any(target_os = "linux", target_os = "android", target_os = "freebsd"))
))]
mod signal;
#[cfg(any(
    feature = "force_signal_backend",
    not(any(target_os = "linux", target_os = "android", target_os = "freebsd"))
))]
use signal as backend;

/// A futex address: a word-sized atomic integer that threads can sleep on.
#[repr(transparent)]
pub(crate) struct RawFutex {
    pub(crate) value: AtomicWord,
}

impl RawFutex {
    pub(crate) const fn new(value: Word) -> Self {
        RawFutex {
            value: AtomicWord::new(value),
        }
    }
}

/// Operations every backend must provide. See spec §4.2.
pub(crate) trait Futex {
    /// Atomically compare `*self` to `value`; if equal, sleep until a
    /// matching `futex_wake`/`futex_requeue` or a spurious wakeup. Returns
    /// promptly if the values already differ. Callers must recheck their
    /// predicate after this returns: spurious wakeups are permitted.
    fn futex_wait(&self, value: Word);

    /// Wake up to `limit` threads currently sleeping on `self`. Returns the
    /// number of threads actually woken, where the backend can tell.
    fn futex_wake(&self, limit: i32) -> i32;
}

impl Futex for RawFutex {
    #[inline]
    fn futex_wait(&self, value: Word) {
        backend::futex_wait(&self.value, value);
    }

    #[inline]
    fn futex_wake(&self, limit: i32) -> i32 {
        backend::futex_wake(&self.value, limit)
    }
}

/// One-time process initialization. Must be called before any primitive that
/// may sleep is used. Not required to be idempotent beyond the first call.
pub fn futex_init() {
    backend::init();
}

// Condvar broadcast wake-up strategy. Whether the active backend supports
// atomically moving waiters between queues decides which of these three
// definitions gets compiled: true for the Linux kernel backend (native
// `FUTEX_CMP_REQUEUE`) and for the signal backend when built with the
// `requeue` feature, false otherwise. FreeBSD's `_umtx_op` has no atomic
// requeue operation, so its kernel backend never qualifies.
#[cfg(all(
    any(target_os = "linux", target_os = "android"),
    not(feature = "force_signal_backend")
))]
pub(crate) fn condvar_broadcast_wake(seq: &RawFutex, mutex_state: &RawFutex) {
    backend::futex_requeue(&seq.value, 1, &mutex_state.value);
}

#[cfg(all(
    feature = "requeue",
    any(
        feature = "force_signal_backend",
        not(any(target_os = "linux", target_os = "android", target_os = "freebsd"))
    )
))]
pub(crate) fn condvar_broadcast_wake(seq: &RawFutex, mutex_state: &RawFutex) {
    backend::futex_requeue(&seq.value, 1, &mutex_state.value);
}

#[cfg(any(
    all(target_os = "freebsd", not(feature = "force_signal_backend")),
    all(
        not(feature = "requeue"),
        any(
            feature = "force_signal_backend",
            not(any(target_os = "linux", target_os = "android", target_os = "freebsd"))
        )
    )
))]
pub(crate) fn condvar_broadcast_wake(seq: &RawFutex, _mutex_state: &RawFutex) {
    let _ = seq.futex_wake(i32::MAX);
}
