//! Stress test
//!
//! Several OS threads create uthreads as fast as they can, detaching half
//! and joining the rest, then wait for the queues to drain.
//!
//! Usage: `stress [CREATORS] [PER_CREATOR]`

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use uthread::{kinfo, kwarn, spawn, PreemptSafeAlloc, RuntimeConfig};

#[global_allocator]
static ALLOC: PreemptSafeAlloc = PreemptSafeAlloc;

fn queued() -> usize {
    (0..uthread::worker_count()).filter_map(uthread::queue_len).sum()
}

fn main() {
    let mut args = std::env::args().skip(1);
    let creators: usize = args.next().and_then(|s| s.parse().ok()).unwrap_or(4);
    let per_creator: usize = args.next().and_then(|s| s.parse().ok()).unwrap_or(10_000);

    if let Err(e) = uthread::init(RuntimeConfig::from_env()) {
        eprintln!("runtime failed to start: {e}");
        std::process::exit(1);
    }
    println!(
        "=== stress: {} creators x {} uthreads on {} workers ===",
        creators,
        per_creator,
        uthread::worker_count()
    );

    let ran = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let threads: Vec<_> = (0..creators)
        .map(|t| {
            let ran = Arc::clone(&ran);
            thread::spawn(move || {
                let mut joined = 0usize;
                let mut pending = Vec::new();
                for i in 0..per_creator {
                    let ran = Arc::clone(&ran);
                    let h = match spawn(move || {
                        ran.fetch_add(1, Ordering::Relaxed);
                        t ^ i
                    }) {
                        Ok(h) => h,
                        Err(e) => {
                            kwarn!("creator {}: spawn failed: {}", t, e);
                            continue;
                        }
                    };
                    if i % 2 == 0 {
                        let _ = h.detach();
                    } else {
                        pending.push((t ^ i, h));
                    }
                    // Bound the number of live stacks
                    if pending.len() >= 256 {
                        for (want, h) in pending.drain(..) {
                            assert_eq!(h.join().ok(), Some(want));
                            joined += 1;
                        }
                    }
                }
                for (want, h) in pending {
                    assert_eq!(h.join().ok(), Some(want));
                    joined += 1;
                }
                joined
            })
        })
        .collect();

    let joined: usize = threads.into_iter().map(|t| t.join().unwrap_or(0)).sum();
    let created = creators * per_creator;

    while ran.load(Ordering::Relaxed) < created || queued() > 0 {
        if start.elapsed() > Duration::from_secs(120) {
            kwarn!("timed out with {} queued", queued());
            std::process::exit(1);
        }
        thread::sleep(Duration::from_millis(10));
    }

    let elapsed = start.elapsed();
    kinfo!("drained in {:?}", elapsed);
    println!(
        "{} uthreads ({} joined) in {:?}: {:.0}/s",
        created,
        joined,
        elapsed,
        created as f64 / elapsed.as_secs_f64()
    );
}
