//! Basic uthread example
//!
//! Spawns a handful of uthreads across the workers, joins them, then
//! computes a Fibonacci number with one uthread per call.
//!
//! # Environment Variables
//!
//! - `UT_NUM_WORKERS=4` - Worker threads (0 = one per core)
//! - `UT_LOG_LEVEL=debug` - Set log level (off, error, warn, info, debug, trace)
//! - `UT_DEBUG=1` - Debug logging plus a config dump at startup

use std::time::Instant;

use uthread::{kdebug, kinfo, spawn, PreemptSafeAlloc, RuntimeConfig};

#[global_allocator]
static ALLOC: PreemptSafeAlloc = PreemptSafeAlloc;

fn fib(n: u64) -> u64 {
    if n < 2 {
        return n;
    }
    let a = spawn(move || fib(n - 1)).expect("spawn");
    let b = spawn(move || fib(n - 2)).expect("spawn");
    a.join().expect("join") + b.join().expect("join")
}

// UT_LOG_LEVEL=debug cargo run -p uthread-basic
fn main() {
    println!("=== uthread Basic Example ===\n");

    if let Err(e) = uthread::init(RuntimeConfig::from_env()) {
        eprintln!("runtime failed to start: {e}");
        std::process::exit(1);
    }
    println!("{} workers online", uthread::worker_count());

    let handles: Vec<_> = (1..=4u64)
        .map(|i| {
            spawn(move || {
                kdebug!("uthread {} started", i);
                let sum: u64 = (0..=i * 1000).sum();
                kdebug!("uthread {} finished", i);
                sum
            })
            .expect("spawn")
        })
        .collect();

    for h in handles {
        let (id, worker) = (h.id(), h.worker());
        println!("uthread {id} on worker {worker} returned {}", h.join().expect("join"));
    }

    let start = Instant::now();
    let n = 12;
    let value = spawn(move || fib(n)).expect("spawn").join().expect("join");
    kinfo!("fib({}) = {} in {:?}", n, value, start.elapsed());
    println!("fib({n}) = {value}");

    println!("\n=== Example Complete ===");
}
