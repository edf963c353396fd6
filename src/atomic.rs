//! Thin façade over the atomic operations the rest of the crate is allowed to
//! use. Every layer above this module reaches for `relaxed`/`acquire`/
//! `release`/`acq_rel` by name instead of `core::sync::atomic::Ordering`
//! directly, so that the set of orderings actually in play stays easy to
//! audit from one place.

use core::sync::atomic::Ordering;

pub(crate) const RELAXED: Ordering = Ordering::Relaxed;
pub(crate) const ACQUIRE: Ordering = Ordering::Acquire;
pub(crate) const RELEASE: Ordering = Ordering::Release;
pub(crate) const ACQ_REL: Ordering = Ordering::AcqRel;

/// The word-sized signed integer used for the mutex state, the condvar
/// sequence counter, and as the compare value of a futex address. Fixed at
/// 32 bits because the kernel futex syscalls only ever compare 32 bits
/// regardless of pointer width.
pub(crate) type Word = i32;
pub(crate) type AtomicWord = core::sync::atomic::AtomicI32;
