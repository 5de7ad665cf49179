//! # uthread-runtime
//!
//! Platform-specific runtime for the uthread green-thread scheduler.
//!
//! This crate provides:
//! - Memory for control blocks and stacks (mmap, behind `MemoryProvider`)
//! - Per-worker lock-free run queues
//! - SIGALRM tick relay and the SIGUSR1 scheduler
//! - Signal-frame context switching (x86_64 Linux)
//! - The idle loop that reclaims finished uthreads

pub mod arch;
pub mod config;
pub mod gcb;
pub mod memory;
pub mod queue;
pub mod scheduler;
pub mod signal;
pub mod tls;
pub mod worker;

// Re-exports
pub use config::RuntimeConfig;
pub use gcb::{EntryFn, ResultDrop};
pub use memory::{MmapProvider, Stack, DEFAULT_PROVIDER};
pub use scheduler::{
    create, create_with_drop, current_id, detach, init, init_with_provider, is_in_uthread, join,
    queue_len, runtime, try_runtime, worker_count, Runtime, UThread,
};
pub use signal::PreemptGuard;
