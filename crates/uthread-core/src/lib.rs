//! # uthread-core
//!
//! Core types and traits for the uthread green-thread runtime.
//!
//! This crate is platform-agnostic and contains no OS-specific code.
//! All platform-specific implementations are in `uthread-runtime`.
//!
//! ## Modules
//!
//! - `id` - uthread identifier type
//! - `state` - uthread lifecycle state and join/detach disposition
//! - `error` - Error types
//! - `umutex` - Spin mutex that stays correct under preemption
//! - `traits` - Memory provider seam
//! - `kprint` - Kernel-style debug printing macros (signal-safe)
//! - `env` - Environment variable utilities

#![allow(dead_code)]

pub mod id;
pub mod state;
pub mod error;
pub mod umutex;
pub mod traits;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use id::UThreadId;
pub use state::{Disposition, UThreadState};
pub use error::{ConfigError, MemoryError, SchedError, SchedResult, WorkerError};
pub use umutex::{UMutex, UMutexGuard};
pub use traits::MemoryProvider;
pub use env::{env_get, env_get_bool, env_get_opt, env_get_str};

/// Constants for memory layout
pub mod constants {
    /// Page size assumed for stack and control-block rounding
    pub const PAGE_SIZE: usize = 4096;

    /// Smallest uthread stack accepted by config validation
    pub const MIN_STACK_SIZE: usize = 64 * 1024;

    /// Smallest alternate signal stack accepted by config validation.
    /// The kernel's frame for AVX-512 machines alone is several KB.
    pub const MIN_ALTSTACK_SIZE: usize = 16 * 1024;

    /// Maximum workers (OS threads)
    pub const MAX_WORKERS: usize = 256;

    /// Round `n` up to a whole number of pages
    #[inline]
    pub const fn page_align(n: usize) -> usize {
        (n + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
    }
}
