//! A futex-backed condition variable: a single monotonically increasing
//! sequence counter. See spec §4.6.

use crate::atomic::RELAXED;
use crate::futex::{self, Futex, RawFutex};
use crate::mutex::{Mutex, MutexGuard};

const SPINS: u32 = 128;

pub struct Condvar {
    seq: RawFutex,
}

impl Condvar {
    pub const fn new() -> Self {
        Condvar {
            seq: RawFutex::new(0),
        }
    }

    /// Caller must hold the mutex `guard` came from. Returns a new guard on
    /// the same mutex once reacquired. Spurious wakeups are permitted:
    /// callers must loop on their own predicate.
    pub fn wait<'a, T>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        let mutex = guard.mutex;
        let snapshot = self.seq.value.load(RELAXED);

        drop(guard);

        // A short spin absorbs very short critical sections without a
        // futex round trip. If the predicate already changed, there is no
        // possibility we were ever requeued, so the mutex's own `lock()`
        // establishes the SLEEPING invariant as usual and we're done.
        for _ in 0..SPINS {
            if self.seq.value.load(RELAXED) != snapshot {
                return mutex.lock();
            }
            core::hint::spin_loop();
        }

        self.seq.futex_wait(snapshot);
        let new_guard = mutex.lock();

        // On the requeue-capable path this wait may have been moved
        // directly onto the mutex's wait address by a concurrent broadcast,
        // bypassing `Mutex::lock`'s own SLEEPING transition. Re-establish
        // the invariant that the unlocker owes a wake.
        mark_mutex_state_sleeping(mutex);

        new_guard
    }

    pub fn notify_one<T>(&self, _mutex: &Mutex<T>) {
        self.seq.value.fetch_add(1, RELAXED);
        self.seq.futex_wake(1);
    }

    pub fn notify_all<T>(&self, mutex: &Mutex<T>) {
        self.seq.value.fetch_add(1, RELAXED);
        futex::condvar_broadcast_wake(&self.seq, &mutex.state);
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}

fn mark_mutex_state_sleeping<T>(mutex: &Mutex<T>) {
    // A plain store, not a read-modify-write: the caller just reacquired
    // the mutex, so nothing else can be racing to change `state` out from
    // under it, and the three states are a sequential enum rather than
    // independent bits (OR-ing SLEEPING's bit pattern into a bare LOCKED
    // would produce a value outside {UNLOCKED, LOCKED, SLEEPING}).
    mutex.state.value.store(crate::mutex::SLEEPING, RELAXED);
}

#[cfg(test)]
mod test {
    use super::Condvar;
    use crate::mutex::Mutex;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn producer_consumer_single_slot() {
        struct Slot {
            value: Option<u32>,
        }

        let mutex = Arc::new(Mutex::new(Slot { value: None }));
        let not_empty = Arc::new(Condvar::new());

        let producer_mutex = Arc::clone(&mutex);
        let producer_cv = Arc::clone(&not_empty);
        let producer = thread::spawn(move || {
            for i in 1..=1000u32 {
                loop {
                    let mut guard = producer_mutex.lock();
                    if guard.value.is_none() {
                        guard.value = Some(i);
                        producer_cv.notify_one(&producer_mutex);
                        break;
                    }
                    drop(guard);
                }
            }
        });

        let mut seen = Vec::with_capacity(1000);
        while seen.len() < 1000 {
            let mut guard = mutex.lock();
            while guard.value.is_none() {
                guard = not_empty.wait(guard);
            }
            seen.push(guard.value.take().unwrap());
        }

        producer.join().unwrap();
        assert_eq!(seen, (1..=1000).collect::<Vec<_>>());
    }

    #[test]
    fn broadcast_releases_all_waiters_exactly_once() {
        const N: usize = 64;
        let mutex = Arc::new(Mutex::new(false));
        let condvar = Arc::new(Condvar::new());

        let handles: Vec<_> = (0..N)
            .map(|_| {
                let mutex = Arc::clone(&mutex);
                let condvar = Arc::clone(&condvar);
                thread::spawn(move || {
                    let mut guard = mutex.lock();
                    while !*guard {
                        guard = condvar.wait(guard);
                    }
                })
            })
            .collect();

        thread::sleep(std::time::Duration::from_millis(50));
        {
            let mut guard = mutex.lock();
            *guard = true;
            condvar.notify_all(&mutex);
        }

        for h in handles {
            h.join().unwrap();
        }
    }

    #[cfg(feature = "requeue")]
    #[test]
    fn requeue_under_repeated_broadcasts() {
        const N: usize = 32;
        let mutex = Arc::new(Mutex::new(0u32));
        let condvar = Arc::new(Condvar::new());

        let handles: Vec<_> = (0..N)
            .map(|target| {
                let mutex = Arc::clone(&mutex);
                let condvar = Arc::clone(&condvar);
                thread::spawn(move || {
                    let target = (target + 1) as u32;
                    let mut guard = mutex.lock();
                    while *guard < target {
                        guard = condvar.wait(guard);
                    }
                })
            })
            .collect();

        for round in 1..=N as u32 {
            thread::sleep(std::time::Duration::from_millis(5));
            let mut guard = mutex.lock();
            *guard = round;
            condvar.notify_all(&mutex);
        }

        for h in handles {
            h.join().unwrap();
        }
    }
}
