use core::ptr;

use crate::atomic::{AtomicWord, Word};
use crate::errno::errno;

pub(crate) fn init() {
    // Nothing to do: the kernel futex facility needs no process-wide setup.
}

pub(crate) fn futex_wait(futex: &AtomicWord, value: Word) {
    let r = unsafe {
        syscall_futex(
            futex.as_ptr(),
            libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
            value,
            ptr::null(),
            ptr::null_mut(),
            0,
        )
    };
    if r == -1 {
        debug_assert!(
            matches!(errno(), libc::EAGAIN | libc::EINTR),
            "unexpected errno from FUTEX_WAIT: {}",
            errno()
        );
    }
}

pub(crate) fn futex_wake(futex: &AtomicWord, limit: i32) -> i32 {
    let r = unsafe {
        syscall_futex(
            futex.as_ptr(),
            libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
            limit,
            ptr::null(),
            ptr::null_mut(),
            0,
        )
    };
    debug_assert!(r >= 0, "unexpected return value from FUTEX_WAKE: {}", r);
    r.max(0) as i32
}

/// Wake up to `limit` waiters on `futex`; requeue the rest (unbounded) onto
/// `other`, without waking them.
pub(crate) fn futex_requeue(futex: &AtomicWord, limit: i32, other: &AtomicWord) -> i32 {
    let r = unsafe {
        syscall_futex(
            futex.as_ptr(),
            libc::FUTEX_CMP_REQUEUE | libc::FUTEX_PRIVATE_FLAG,
            limit,
            i32::MAX as *const libc::timespec,
            other.as_ptr(),
            futex.load(core::sync::atomic::Ordering::Relaxed),
        )
    };
    debug_assert!(
        r >= 0,
        "unexpected return value from FUTEX_CMP_REQUEUE: {}",
        r
    );
    r.max(0) as i32
}

unsafe fn syscall_futex(
    uaddr: *mut libc::c_int,
    futex_op: libc::c_int,
    val: libc::c_int,
    timeout_or_val2: *const libc::timespec,
    uaddr2: *mut libc::c_int,
    val3: libc::c_int,
) -> libc::c_long {
    libc::syscall(
        libc::SYS_futex,
        uaddr,
        futex_op,
        val,
        timeout_or_val2,
        uaddr2,
        val3,
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn wait_returns_immediately_on_mismatch() {
        let futex = AtomicWord::new(0);
        futex_wait(&futex, 1);
    }

    #[test]
    fn wake_wakes_waiting_thread() {
        static FUTEX: AtomicWord = AtomicWord::new(0);
        let handle = thread::spawn(|| {
            futex_wait(&FUTEX, 0);
        });
        thread::sleep(Duration::from_millis(50));
        FUTEX.store(1, Ordering::Relaxed);
        futex_wake(&FUTEX, 1);
        handle.join().unwrap();
    }
}
