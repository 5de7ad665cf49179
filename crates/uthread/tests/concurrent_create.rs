//! Many OS threads creating into one worker's queue at once

use std::thread;
use std::time::Duration;

use uthread::{spawn, PreemptSafeAlloc, RuntimeConfig, SchedError};

#[global_allocator]
static ALLOC: PreemptSafeAlloc = PreemptSafeAlloc;

const CREATORS: usize = 8;
const PER_CREATOR: usize = 50;

#[test]
fn test_no_lost_inserts() {
    let config = RuntimeConfig::new()
        .num_workers(1)
        .preempt_interval(Duration::from_micros(500));
    match uthread::init(config) {
        Ok(()) | Err(SchedError::AlreadyInitialized) => {}
        Err(e) => panic!("runtime failed to start: {e}"),
    }

    let creators: Vec<_> = (0..CREATORS)
        .map(|t| {
            thread::spawn(move || {
                (0..PER_CREATOR)
                    .map(|i| spawn(move || t * PER_CREATOR + i).unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut results: Vec<usize> = creators
        .into_iter()
        .flat_map(|c| c.join().unwrap())
        .map(|h| h.join().unwrap())
        .collect();
    results.sort_unstable();
    assert_eq!(results, (0..CREATORS * PER_CREATOR).collect::<Vec<_>>());
}
