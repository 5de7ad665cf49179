//! Results survive joins in any order

use std::collections::HashSet;
use std::time::Duration;

use uthread::{spawn, PreemptSafeAlloc, RuntimeConfig, SchedError};

#[global_allocator]
static ALLOC: PreemptSafeAlloc = PreemptSafeAlloc;

fn setup() {
    let config = RuntimeConfig::new()
        .num_workers(2)
        .preempt_interval(Duration::from_millis(2));
    match uthread::init(config) {
        Ok(()) | Err(SchedError::AlreadyInitialized) => {}
        Err(e) => panic!("runtime failed to start: {e}"),
    }
}

#[test]
fn test_join_in_reverse_order() {
    setup();
    let handles: Vec<_> = (0..100u32).map(|i| spawn(move || i).unwrap()).collect();

    let mut seen = HashSet::new();
    for h in handles.into_iter().rev() {
        assert!(seen.insert(h.join().unwrap()));
    }
    assert_eq!(seen, (0..100).collect());
}

#[test]
fn test_ids_are_unique() {
    setup();
    let handles: Vec<_> = (0..32).map(|_| spawn(|| ()).unwrap()).collect();
    let ids: HashSet<_> = handles.iter().map(|h| h.id()).collect();
    assert_eq!(ids.len(), 32);
    assert!(ids.iter().all(|id| !id.is_anchor()));
    for h in handles {
        h.join().unwrap();
    }
}

#[test]
fn test_owned_results() {
    setup();
    let h = spawn(|| vec![String::from("a"), String::from("b")]).unwrap();
    assert_eq!(h.join().unwrap(), ["a", "b"]);
}

#[test]
fn test_current_id_matches_handle() {
    setup();
    assert_eq!(uthread::current_id(), None);
    let h = spawn(uthread::current_id).unwrap();
    let id = h.id();
    assert_eq!(h.join().unwrap(), Some(id));
}
