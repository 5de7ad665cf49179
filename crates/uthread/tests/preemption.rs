//! CPU-bound uthreads that never yield still share a worker

use std::hint;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use uthread::{spawn, PreemptSafeAlloc, RuntimeConfig, SchedError};

#[global_allocator]
static ALLOC: PreemptSafeAlloc = PreemptSafeAlloc;

fn setup() {
    let config = RuntimeConfig::new()
        .num_workers(1)
        .preempt_interval(Duration::from_millis(1));
    match uthread::init(config) {
        Ok(()) | Err(SchedError::AlreadyInitialized) => {}
        Err(e) => panic!("runtime failed to start: {e}"),
    }
}

const SPINNERS: usize = 4;

static STOP: AtomicBool = AtomicBool::new(false);
static COUNTERS: [AtomicU64; SPINNERS] = [const { AtomicU64::new(0) }; SPINNERS];

#[test]
fn test_spinners_all_progress_on_one_worker() {
    setup();
    let handles: Vec<_> = (0..SPINNERS)
        .map(|i| {
            spawn(move || {
                while !STOP.load(Ordering::Relaxed) {
                    COUNTERS[i].fetch_add(1, Ordering::Relaxed);
                    hint::spin_loop();
                }
            })
            .unwrap()
        })
        .collect();

    let start = Instant::now();
    let all_ran = loop {
        if COUNTERS.iter().all(|c| c.load(Ordering::Relaxed) > 0) {
            break true;
        }
        if start.elapsed() > Duration::from_secs(10) {
            break false;
        }
        thread::sleep(Duration::from_millis(10));
    };

    STOP.store(true, Ordering::Relaxed);
    for h in handles {
        h.join().unwrap();
    }
    assert!(all_ran, "{COUNTERS:?}");
}

#[inline(never)]
fn float_work(seed: u64) -> f64 {
    let mut acc = 0.0f64;
    for i in 0..2_000_000u64 {
        let x = (i ^ seed) as f64;
        acc += x.sqrt() / (1.0 + (i % 7) as f64);
    }
    acc
}

#[test]
fn test_float_state_survives_preemption() {
    setup();
    let handles: Vec<_> = (0..4u64).map(|seed| spawn(move || float_work(seed)).unwrap()).collect();
    for (seed, h) in handles.into_iter().enumerate() {
        assert_eq!(h.join().unwrap().to_bits(), float_work(seed as u64).to_bits());
    }
}
