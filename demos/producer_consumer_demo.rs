//! Single-slot producer/consumer over a condition variable: the producer
//! blocks while the slot is full, the consumer blocks while it is empty.
//! Exercises the condvar's predicate-loop contract and, on backends that
//! support it, the broadcast requeue path.

use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

use futex_sync::{futex_init, Condvar, Mutex};

const ITEMS: u32 = 10_000;

struct Slot {
    value: Option<u32>,
    done: bool,
}

fn main() -> ExitCode {
    futex_init();

    let mutex = Arc::new(Mutex::new(Slot {
        value: None,
        done: false,
    }));
    let not_empty = Arc::new(Condvar::new());
    let not_full = Arc::new(Condvar::new());

    let producer = {
        let mutex = Arc::clone(&mutex);
        let not_empty = Arc::clone(&not_empty);
        let not_full = Arc::clone(&not_full);
        thread::spawn(move || {
            for item in 0..ITEMS {
                let mut guard = mutex.lock();
                while guard.value.is_some() {
                    guard = not_full.wait(guard);
                }
                guard.value = Some(item);
                not_empty.notify_one(&mutex);
            }
            let mut guard = mutex.lock();
            guard.done = true;
            not_empty.notify_one(&mutex);
        })
    };

    let mut sum = 0u64;
    loop {
        let mut guard = mutex.lock();
        while guard.value.is_none() && !guard.done {
            guard = not_empty.wait(guard);
        }
        match guard.value.take() {
            Some(item) => {
                not_full.notify_one(&mutex);
                drop(guard);
                sum += item as u64;
            }
            None => break,
        }
    }

    if producer.join().is_err() {
        return ExitCode::FAILURE;
    }

    let expected: u64 = (0..ITEMS as u64).sum();
    if sum == expected {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
