//! Detached uthreads run to completion and are reclaimed

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use uthread::{spawn, PreemptSafeAlloc, RuntimeConfig, SchedError};

#[global_allocator]
static ALLOC: PreemptSafeAlloc = PreemptSafeAlloc;

fn setup() {
    let config = RuntimeConfig::new()
        .num_workers(2)
        .preempt_interval(Duration::from_millis(1))
        .idle_sleep(Duration::from_micros(200));
    match uthread::init(config) {
        Ok(()) | Err(SchedError::AlreadyInitialized) => {}
        Err(e) => panic!("runtime failed to start: {e}"),
    }
}

fn wait_for(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    done()
}

fn total_queued() -> usize {
    (0..uthread::worker_count()).filter_map(uthread::queue_len).sum()
}

struct Counted(Arc<AtomicUsize>);

impl Drop for Counted {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

// Both cases live in one test so the queue-length checks see only their
// own uthreads
#[test]
fn test_detached_uthreads_drain() {
    setup();

    let ran = Arc::new(AtomicUsize::new(0));
    for _ in 0..64 {
        let ran = Arc::clone(&ran);
        spawn(move || {
            ran.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap()
        .detach()
        .unwrap();
    }
    assert!(wait_for(Duration::from_secs(10), || ran.load(Ordering::SeqCst) == 64));
    assert!(wait_for(Duration::from_secs(10), || total_queued() == 0));

    // Dropping the handle detaches too, and the result is dropped
    let dropped = Arc::new(AtomicUsize::new(0));
    for _ in 0..16 {
        let dropped = Arc::clone(&dropped);
        drop(spawn(move || Counted(dropped)).unwrap());
    }
    assert!(wait_for(Duration::from_secs(10), || dropped.load(Ordering::SeqCst) == 16));
    assert!(wait_for(Duration::from_secs(10), || total_queued() == 0));
}
