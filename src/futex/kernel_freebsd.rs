use core::ptr;

use crate::atomic::{AtomicWord, Word};

pub(crate) fn init() {
    // `_umtx_op` needs no process-wide setup.
}

pub(crate) fn futex_wait(futex: &AtomicWord, value: Word) {
    unsafe {
        libc::_umtx_op(
            futex.as_ptr() as *mut libc::c_void,
            libc::UMTX_OP_WAIT_UINT_PRIVATE,
            value as libc::c_ulong,
            ptr::null_mut(),
            ptr::null_mut(),
        );
    }
}

pub(crate) fn futex_wake(futex: &AtomicWord, limit: i32) -> i32 {
    let r = unsafe {
        libc::_umtx_op(
            futex.as_ptr() as *mut libc::c_void,
            libc::UMTX_OP_WAKE_PRIVATE,
            limit as libc::c_ulong,
            ptr::null_mut(),
            ptr::null_mut(),
        )
    };
    debug_assert!(r == 0, "unexpected return value from UMTX_OP_WAKE: {}", r);
    limit.max(0)
}

// No `futex_requeue`: `_umtx_op` has no atomic compare-and-requeue
// operation, so the FreeBSD kernel backend does not implement it. Condvar
// broadcast falls back to waking everyone; see `futex::condvar_broadcast_wake`.

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
