//! Preemption demo
//!
//! Runs CPU-bound uthreads that never yield on a single worker and prints
//! how far each one got. Every counter moving means the timer tick is
//! switching between them.
//!
//! Usage: `preemption [SPINNERS] [MILLIS]`

use std::hint;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use uthread::{env_get, kinfo, kprintln, spawn, PreemptSafeAlloc, RuntimeConfig};

#[global_allocator]
static ALLOC: PreemptSafeAlloc = PreemptSafeAlloc;

fn main() {
    let mut args = std::env::args().skip(1);
    let spinners: usize = args.next().and_then(|s| s.parse().ok()).unwrap_or(4);
    let millis: u64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(500);

    let config = RuntimeConfig::from_env()
        .num_workers(1)
        .preempt_interval(Duration::from_micros(env_get("UT_PREEMPT_INTERVAL_US", 1_000u64)));
    if let Err(e) = uthread::init(config) {
        eprintln!("runtime failed to start: {e}");
        std::process::exit(1);
    }

    let stop = Arc::new(AtomicBool::new(false));
    let counters: Arc<Vec<AtomicU64>> = Arc::new((0..spinners).map(|_| AtomicU64::new(0)).collect());

    let handles: Vec<_> = (0..spinners)
        .map(|i| {
            let stop = Arc::clone(&stop);
            let counters = Arc::clone(&counters);
            spawn(move || {
                kprintln!("spinner {} running", i);
                while !stop.load(Ordering::Relaxed) {
                    counters[i].fetch_add(1, Ordering::Relaxed);
                    hint::spin_loop();
                }
            })
            .expect("spawn")
        })
        .collect();

    for tick in 1..=5 {
        thread::sleep(Duration::from_millis(millis / 5));
        let snapshot: Vec<u64> = counters.iter().map(|c| c.load(Ordering::Relaxed)).collect();
        println!("t{tick}: {snapshot:?}");
    }

    stop.store(true, Ordering::Relaxed);
    for h in handles {
        h.join().expect("join");
    }

    let starved = counters.iter().filter(|c| c.load(Ordering::Relaxed) == 0).count();
    kinfo!("{} spinners, {} starved", spinners, starved);
    if starved > 0 {
        std::process::exit(1);
    }
    println!("all {spinners} spinners made progress on one worker");
}
