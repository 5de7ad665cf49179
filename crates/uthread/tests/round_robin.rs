//! Placement of new uthreads across workers

use std::time::Duration;

use uthread::{PreemptSafeAlloc, RuntimeConfig};

#[global_allocator]
static ALLOC: PreemptSafeAlloc = PreemptSafeAlloc;

const WORKERS: usize = 4;

fn square(x: usize) -> usize {
    x * x
}

#[test]
fn test_first_creates_land_on_distinct_workers() {
    let config = RuntimeConfig::new()
        .num_workers(WORKERS)
        .preempt_interval(Duration::from_millis(1));
    uthread::init(config).unwrap();
    assert_eq!(uthread::worker_count(), WORKERS);
    assert_eq!(uthread::queue_len(WORKERS), None);

    let handles: Vec<_> = (0..2 * WORKERS).map(|i| uthread::create(square, i).unwrap()).collect();

    let first: Vec<_> = handles[..WORKERS].iter().map(|h| h.worker()).collect();
    assert_eq!(first, (0..WORKERS).collect::<Vec<_>>());
    for (i, h) in handles.iter().enumerate() {
        assert_eq!(h.worker(), i % WORKERS);
    }

    for (i, h) in handles.into_iter().enumerate() {
        assert_eq!(uthread::join(h).unwrap(), i * i);
    }
}
