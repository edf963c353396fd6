//! A futex-backed spinlock, mutex and condition variable.
//!
//! The normal build uses a real kernel futex where the target provides one
//! (Linux's `SYS_futex`, FreeBSD's `_umtx_op`) and falls back to a userspace
//! emulation built on `SIGUSR1` and per-address wait queues everywhere else.
//! Building with the `pthread` feature bypasses all of that and forwards
//! [`Mutex`]/[`Condvar`] straight to the host's `pthread_mutex_t`/
//! `pthread_cond_t`, which is useful as a correctness baseline and on
//! platforms where the signal backend is undesirable.
//!
//! [`futex_init`] must run once, before any other thread can reach a
//! primitive that might sleep, whenever the signal backend is active (it is
//! a cheap no-op on the kernel and pthread backends, but it is always safe
//! and always cheap to call).

mod atomic;
mod spin;

#[cfg(not(feature = "pthread"))]
mod errno;
#[cfg(not(feature = "pthread"))]
mod futex;
#[cfg(not(feature = "pthread"))]
mod mutex;
#[cfg(not(feature = "pthread"))]
mod condvar;

pub use spin::Spinlock;

#[cfg(not(feature = "pthread"))]
pub use futex::futex_init;
#[cfg(not(feature = "pthread"))]
pub use mutex::{Mutex, MutexGuard};
#[cfg(not(feature = "pthread"))]
pub use condvar::Condvar;

#[cfg(feature = "pthread")]
pub use futex::pthread::{Condvar, Mutex, MutexGuard};
#[cfg(feature = "pthread")]
pub use futex::futex_init;

#[cfg(feature = "pthread")]
mod futex {
    pub mod pthread;

    /// No process-wide setup is needed when every primitive is a thin
    /// wrapper over the host's own pthreads implementation.
    pub fn futex_init() {}
}
