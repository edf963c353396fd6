//! Four threads incrementing a shared counter under the futex-backed mutex.
//! Exercises the contended slow path: 128 spins is not enough to avoid
//! sleeping with this many threads on a modest number of cores.

use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

use futex_sync::{futex_init, Mutex};

const THREADS: usize = 4;
const ITERS: usize = 1_000_000;

fn main() -> ExitCode {
    futex_init();

    let counter = Arc::new(Mutex::new(0u64));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let counter = Arc::clone(&counter);
            thread::spawn(move || {
                for _ in 0..ITERS {
                    *counter.lock() += 1;
                }
            })
        })
        .collect();

    for handle in handles {
        if handle.join().is_err() {
            return ExitCode::FAILURE;
        }
    }

    if *counter.lock() == (THREADS * ITERS) as u64 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
