//! Userspace emulation of a futex for hosts with no kernel futex facility,
//! using a reserved wake signal and a fixed-size hashed wait-queue table.
//!
//! With the `requeue` feature (on by default) this is the complete variant:
//! a per-waiter spinlock guards a waiter's address/home-queue fields so
//! `futex_requeue` can atomically move a sleeping waiter from one bucket to
//! another, and the waiter cooperates by re-locking whatever bucket it
//! currently belongs to after it wakes (it may have moved while asleep).
//! Without that feature, `futex_requeue` and the per-waiter lock/home-queue
//! machinery it needs are compiled out entirely, and a woken waiter simply
//! re-locks the bucket it originally queued on.

use core::cell::UnsafeCell;
use core::ptr;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::atomic::{AtomicWord, Word};
use crate::spin::Spinlock;

const WAKE_SIGNAL: libc::c_int = libc::SIGUSR1;
const TABLE_SIZE: usize = 64;

struct Waiter {
    thread_id: thread_id::Tid,
    /// The futex address this waiter is queued on, checked by `futex_wake`/
    /// `futex_requeue` to skip bucket-mates that collided into the same
    /// table slot but are waiting on a different address.
    address: AtomicUsize,
    /// Index into `TABLE` of the bucket this waiter is currently linked
    /// into. Only mutated by `futex_requeue`, which always holds both the
    /// waiter's own lock and the lock of the bucket it's being moved out
    /// of. Read without a lock to decide which bucket to lock next;
    /// re-checked once that lock (and the waiter's own lock) is held.
    #[cfg(feature = "requeue")]
    home_queue: AtomicUsize,
    #[cfg(feature = "requeue")]
    lock: Spinlock,
    prev: UnsafeCell<*mut Waiter>,
    next: UnsafeCell<*mut Waiter>,
}

// SAFETY: all mutable fields are only touched while holding either the
// owning bucket's lock or the waiter's own lock.
unsafe impl Sync for Waiter {}

#[repr(align(64))]
struct Bucket {
    lock: Spinlock,
    head: UnsafeCell<*mut Waiter>,
    tail: UnsafeCell<*mut Waiter>,
}

impl Bucket {
    const fn new() -> Self {
        Bucket {
            lock: Spinlock::new(),
            head: UnsafeCell::new(ptr::null_mut()),
            tail: UnsafeCell::new(ptr::null_mut()),
        }
    }
}

// SAFETY: `head`/`tail` are only touched while holding `lock`.
unsafe impl Sync for Bucket {}

const BUCKET_INIT: Bucket = Bucket::new();
static TABLE: [Bucket; TABLE_SIZE] = [BUCKET_INIT; TABLE_SIZE];

// Bit-mixing hash over the futex address, not a modulo on the raw bits:
// futex addresses are pointer-aligned and share low-bit patterns, which
// would otherwise funnel everything into a handful of buckets.
// https://nullprogram.com/blog/2018/07/31/
fn bucket_index(addr: usize) -> usize {
    let mut i = addr as u64;
    i ^= i >> 16;
    i = i.wrapping_mul(0x45d9f3b);
    i ^= i >> 16;
    i = i.wrapping_mul(0x45d9f3b);
    i ^= i >> 16;
    (i % TABLE_SIZE as u64) as usize
}

/// Link `waiter` onto the tail of `bucket`. Caller holds `bucket.lock`.
unsafe fn push_back(bucket: &Bucket, waiter: &Waiter) {
    let ptr = waiter as *const Waiter as *mut Waiter;
    *waiter.prev.get() = *bucket.tail.get();
    *waiter.next.get() = ptr::null_mut();
    match NonNull::new(*bucket.tail.get()) {
        Some(tail) => *(*tail.as_ptr()).next.get() = ptr,
        None => *bucket.head.get() = ptr,
    }
    *bucket.tail.get() = ptr;
}

/// Unlink `waiter` from `bucket`. Caller holds `bucket.lock`.
unsafe fn unlink(bucket: &Bucket, waiter: &Waiter) {
    let prev = *waiter.prev.get();
    let next = *waiter.next.get();
    match NonNull::new(prev) {
        Some(p) => *(*p.as_ptr()).next.get() = next,
        None => *bucket.head.get() = next,
    }
    match NonNull::new(next) {
        Some(n) => *(*n.as_ptr()).prev.get() = prev,
        None => *bucket.tail.get() = prev,
    }
}

pub(crate) fn init() {
    unsafe {
        let mut set: libc::sigset_t = core::mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, WAKE_SIGNAL);
        let r = libc::pthread_sigmask(libc::SIG_BLOCK, &set, ptr::null_mut());
        debug_assert_eq!(r, 0, "failed to block the futex wake signal");
    }
}

fn block_for_wake_signal() {
    unsafe {
        let mut set: libc::sigset_t = core::mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, WAKE_SIGNAL);
        let mut delivered: libc::c_int = 0;
        libc::sigwait(&set, &mut delivered);
    }
}

pub(crate) fn futex_wait(futex: &AtomicWord, value: Word) {
    let addr = futex as *const AtomicWord as usize;
    let bucket_index = self::bucket_index(addr);
    let bucket = &TABLE[bucket_index];

    let waiter = Waiter {
        thread_id: thread_id::current(),
        address: AtomicUsize::new(addr),
        #[cfg(feature = "requeue")]
        home_queue: AtomicUsize::new(bucket_index),
        #[cfg(feature = "requeue")]
        lock: Spinlock::new(),
        prev: UnsafeCell::new(ptr::null_mut()),
        next: UnsafeCell::new(ptr::null_mut()),
    };

    // Acquire the bucket lock; between attempts re-check the futex so a
    // wait that would be pointless doesn't block a waking contender.
    while !bucket.lock.try_lock() {
        if futex.load(Ordering::Relaxed) != value {
            return;
        }
        core::hint::spin_loop();
    }

    unsafe { push_back(bucket, &waiter) };

    let must_sleep = futex.load(Ordering::Relaxed) == value;
    bucket.lock.unlock();

    if must_sleep {
        // Exactly one signal delivery resumes this thread: a real wake, or
        // a spurious one; either way the caller above us rechecks its own
        // predicate, so we don't loop here ourselves.
        block_for_wake_signal();
    }

    #[cfg(feature = "requeue")]
    {
        // Reacquire: a concurrent `futex_requeue` may have moved us to a
        // different bucket while we slept, so lock whichever bucket we
        // believe is home, lock ourselves, and retry if that belief turns
        // out stale.
        loop {
            let home_index = waiter.home_queue.load(Ordering::Acquire);
            let home = &TABLE[home_index];
            home.lock.lock();
            waiter.lock.lock();
            if waiter.home_queue.load(Ordering::Relaxed) != home_index {
                waiter.lock.unlock();
                home.lock.unlock();
                continue;
            }
            unsafe { unlink(home, &waiter) };
            waiter.lock.unlock();
            home.lock.unlock();
            break;
        }
    }

    #[cfg(not(feature = "requeue"))]
    {
        // No requeue support means no backend ever moves us to a different
        // bucket: the one we pushed onto above is still the right one.
        bucket.lock.lock();
        unsafe { unlink(bucket, &waiter) };
        bucket.lock.unlock();
    }
}

pub(crate) fn futex_wake(futex: &AtomicWord, limit: i32) -> i32 {
    let addr = futex as *const AtomicWord as usize;
    let bucket = &TABLE[bucket_index(addr)];
    bucket.lock.lock();

    let mut count = 0i32;
    let mut cur = unsafe { *bucket.head.get() };
    while !cur.is_null() && count < limit {
        let waiter = unsafe { &*cur };
        let next = unsafe { *waiter.next.get() };
        if waiter.address.load(Ordering::Relaxed) == addr {
            count += 1;
            if count >= limit || next.is_null() {
                let tid = waiter.thread_id;
                bucket.lock.unlock();
                thread_id::kill(tid, WAKE_SIGNAL);
                return count;
            }
            thread_id::kill(waiter.thread_id, WAKE_SIGNAL);
        }
        cur = next;
    }

    bucket.lock.unlock();
    count
}

/// Wake up to `limit` waiters on `futex`; requeue any remaining waiters onto
/// `other` without waking them.
#[cfg(feature = "requeue")]
pub(crate) fn futex_requeue(futex: &AtomicWord, limit: i32, other: &AtomicWord) -> i32 {
    let addr = futex as *const AtomicWord as usize;
    let other_addr = other as *const AtomicWord as usize;
    let src_index = bucket_index(addr);
    let dst_index = bucket_index(other_addr);

    // Lock ordering: ascending bucket index. Any two call sites that need
    // to hold two bucket locks at once agree on this order, and this is
    // the only operation that ever takes two, so it's deadlock-free
    // regardless of how the index relates to the real address order.
    let (lo, hi) = if src_index <= dst_index {
        (src_index, dst_index)
    } else {
        (dst_index, src_index)
    };
    TABLE[lo].lock.lock();
    if hi != lo {
        TABLE[hi].lock.lock();
    }

    let src = &TABLE[src_index];
    let dst = &TABLE[dst_index];

    let mut woken = 0i32;
    let mut cur = unsafe { *src.head.get() };
    while !cur.is_null() {
        let waiter = unsafe { &*cur };
        let next = unsafe { *waiter.next.get() };
        if waiter.address.load(Ordering::Relaxed) == addr {
            if woken < limit {
                woken += 1;
                thread_id::kill(waiter.thread_id, WAKE_SIGNAL);
            } else {
                waiter.lock.lock();
                unsafe {
                    unlink(src, waiter);
                    waiter.address.store(other_addr, Ordering::Relaxed);
                    waiter.home_queue.store(dst_index, Ordering::Release);
                    push_back(dst, waiter);
                }
                waiter.lock.unlock();
            }
        }
        cur = next;
    }

    if hi != lo {
        TABLE[hi].lock.unlock();
    }
    TABLE[lo].lock.unlock();
    woken
}

#[cfg(any(target_os = "linux", target_os = "android"))]
mod thread_id {
    use core::cell::Cell;
    use core::sync::atomic::{AtomicI32, Ordering};

    pub(crate) type Tid = libc::pid_t;

    fn pid() -> libc::pid_t {
        static PID: AtomicI32 = AtomicI32::new(0);
        let mut p = PID.load(Ordering::Relaxed);
        if p == 0 {
            p = unsafe { libc::getpid() };
            PID.store(p, Ordering::Relaxed);
        }
        p
    }

    pub(crate) fn current() -> Tid {
        std::thread_local! {
            static TID: Cell<libc::pid_t> = Cell::new(0);
        }
        TID.with(|cell| {
            let mut tid = cell.get();
            if tid == 0 {
                tid = unsafe { libc::syscall(libc::SYS_gettid) as libc::pid_t };
                cell.set(tid);
            }
            tid
        })
    }

    // `pthread_kill` carries significant overhead on Linux; `tgkill` lets us
    // target a specific kernel thread id directly.
    pub(crate) fn kill(tid: Tid, sig: libc::c_int) {
        unsafe {
            libc::syscall(libc::SYS_tgkill, pid(), tid, sig);
        }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
mod thread_id {
    pub(crate) type Tid = libc::pthread_t;

    pub(crate) fn current() -> Tid {
        unsafe { libc::pthread_self() }
    }

    pub(crate) fn kill(tid: Tid, sig: libc::c_int) {
        unsafe {
            libc::pthread_kill(tid, sig);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn init_once() {
        static ONCE: std::sync::Once = std::sync::Once::new();
        ONCE.call_once(init);
    }

    #[test]
    fn wait_returns_immediately_on_mismatch() {
        init_once();
        let futex = AtomicWord::new(0);
        futex_wait(&futex, 1);
    }

    #[test]
    fn wake_wakes_waiting_thread() {
        init_once();
        static FUTEX: AtomicWord = AtomicWord::new(0);
        let handle = thread::spawn(|| {
            futex_wait(&FUTEX, 0);
        });
        thread::sleep(Duration::from_millis(50));
        FUTEX.store(1, Ordering::Relaxed);
        futex_wake(&FUTEX, 1);
        handle.join().unwrap();
    }

    #[test]
    fn hash_collision_does_not_cross_wake() {
        init_once();
        // Two addresses that collide at TABLE_SIZE = 64: search static
        // storage for a pair whose hashes land in the same bucket.
        static SLOTS: [AtomicWord; 256] = {
            const INIT: AtomicWord = AtomicWord::new(0);
            [INIT; 256]
        };
        let mut a = None;
        let mut b = None;
        'search: for i in 0..SLOTS.len() {
            for j in (i + 1)..SLOTS.len() {
                let addr_i = &SLOTS[i] as *const AtomicWord as usize;
                let addr_j = &SLOTS[j] as *const AtomicWord as usize;
                if bucket_index(addr_i) == bucket_index(addr_j) {
                    a = Some(i);
                    b = Some(j);
                    break 'search;
                }
            }
        }
        let (a, b) = (a.expect("collision exists"), b.expect("collision exists"));

        let woken_a = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let woken_a2 = Arc::clone(&woken_a);
        let handle = thread::spawn(move || {
            futex_wait(&SLOTS[a], 0);
            woken_a2.store(true, Ordering::SeqCst);
        });

        // Wake the unrelated, same-bucket address; A must not wake.
        thread::sleep(Duration::from_millis(50));
        SLOTS[b].store(1, Ordering::SeqCst);
        futex_wake(&SLOTS[b], i32::MAX);
        thread::sleep(Duration::from_millis(50));
        assert!(!woken_a.load(Ordering::SeqCst));

        SLOTS[a].store(1, Ordering::SeqCst);
        futex_wake(&SLOTS[a], i32::MAX);
        handle.join().unwrap();
        assert!(woken_a.load(Ordering::SeqCst));
    }

    #[cfg(feature = "requeue")]
    #[test]
    fn requeue_moves_waiters_without_waking_them() {
        init_once();
        static A: AtomicWord = AtomicWord::new(0);
        static B: AtomicWord = AtomicWord::new(0);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                thread::spawn(|| {
                    futex_wait(&A, 0);
                })
            })
            .collect();
        thread::sleep(Duration::from_millis(50));

        // Wake none, requeue all four onto B.
        let woken = futex_requeue(&A, 0, &B);
        assert_eq!(woken, 0);

        // None of the threads should have returned yet: they are asleep on
        // B now, waiting for a wake on B.
        thread::sleep(Duration::from_millis(50));

        B.store(1, Ordering::SeqCst);
        futex_wake(&B, i32::MAX);
        for h in handles {
            h.join().unwrap();
        }
    }
}
