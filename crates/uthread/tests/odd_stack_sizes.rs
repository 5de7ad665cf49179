//! Stack sizes that aren't multiples of 16 still give aligned stacks

use std::time::Duration;

use uthread::{spawn, PreemptSafeAlloc, RuntimeConfig};

#[global_allocator]
static ALLOC: PreemptSafeAlloc = PreemptSafeAlloc;

#[test]
fn test_uthreads_exit_with_odd_stack_sizes() {
    let config = RuntimeConfig::new()
        .num_workers(1)
        .preempt_interval(Duration::from_millis(1))
        .stack_size(64 * 1024 + 24)
        .altstack_size(64 * 1024 + 8)
        .cleanup_stack_size(16 * 1024 + 8);
    assert!(config.validate().is_ok());
    uthread::init(config).unwrap();

    // Every exit runs on the cleanup stack
    let handles: Vec<_> = (0..200u64).map(|i| spawn(move || i * 3).unwrap()).collect();
    for (i, h) in handles.into_iter().enumerate() {
        assert_eq!(h.join().unwrap(), i as u64 * 3);
    }
}
