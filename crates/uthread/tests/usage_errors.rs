//! Misuse of join and detach is reported, not undefined

use std::hint;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use uthread::{PreemptSafeAlloc, RuntimeConfig, SchedError};

#[global_allocator]
static ALLOC: PreemptSafeAlloc = PreemptSafeAlloc;

static GATE: AtomicBool = AtomicBool::new(false);

fn gated(arg: usize) -> usize {
    while !GATE.load(Ordering::Acquire) {
        hint::spin_loop();
    }
    arg
}

#[test]
fn test_join_and_detach_misuse() {
    let config = RuntimeConfig::new()
        .num_workers(1)
        .preempt_interval(Duration::from_millis(1));
    uthread::init(config).unwrap();
    assert_eq!(uthread::init(RuntimeConfig::new()), Err(SchedError::AlreadyInitialized));

    // Held open by the gate, so the block can't be reclaimed in between
    let detached = uthread::create(gated, 1).unwrap();
    uthread::detach(detached).unwrap();
    assert_eq!(uthread::detach(detached), Err(SchedError::Detached));
    assert_eq!(uthread::join(detached), Err(SchedError::Detached));

    let joined = uthread::create(gated, 2).unwrap();
    GATE.store(true, Ordering::Release);
    assert_eq!(uthread::join(joined), Ok(2));

    // Still linked, or already reclaimed
    let again = uthread::join(joined).unwrap_err();
    assert!(matches!(again, SchedError::AlreadyJoined | SchedError::UThreadNotFound), "{again:?}");
    let late = uthread::detach(joined).unwrap_err();
    assert!(matches!(late, SchedError::AlreadyJoined | SchedError::UThreadNotFound), "{late:?}");
}
