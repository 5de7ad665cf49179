//! Runtime configuration
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Builder methods
//! 2. `UT_*` environment variables (read by `from_env`)
//! 3. User file named by `UT_CONFIG_RS` at build time
//! 4. Library defaults
//!
//! # Example
//!
//! ```rust,ignore
//! use uthread_runtime::config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_env()
//!     .num_workers(2)
//!     .preempt_interval(Duration::from_millis(5));
//! ```

pub mod defaults;

use std::time::Duration;

use uthread_core::constants::{MAX_WORKERS, MIN_ALTSTACK_SIZE, MIN_STACK_SIZE};
use uthread_core::env::{env_get, env_get_bool};
use uthread_core::error::ConfigError;
use uthread_core::kprintln;

/// Shortest accepted tick. Below this the relay spends more time switching
/// than the uthreads spend running.
pub const MIN_PREEMPT_INTERVAL: Duration = Duration::from_micros(50);

/// Runtime configuration with builder pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Number of worker OS threads (each owns one run queue)
    pub num_workers: usize,
    /// Period of the SIGALRM tick that drives preemption
    pub preempt_interval: Duration,
    /// Stack size of each uthread
    pub stack_size: usize,
    /// Per-worker alternate signal stack
    pub altstack_size: usize,
    /// Per-worker stack used while a finished uthread releases its own stack
    pub cleanup_stack_size: usize,
    /// How long an idle worker sleeps when nothing in its queue is runnable
    pub idle_sleep: Duration,
    /// Spins in join before falling back to `yield_now`
    pub join_spins: u32,
    /// Raise the log level to debug at startup
    pub debug_logging: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Online cores, or 1 if the platform can't tell
pub fn online_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn resolve_workers(n: usize) -> usize {
    if n == 0 {
        online_cores().min(MAX_WORKERS)
    } else {
        n
    }
}

impl RuntimeConfig {
    /// Compile-time defaults with environment overrides
    ///
    /// Environment variables (all optional):
    /// - `UT_NUM_WORKERS` - worker threads (0 = online cores)
    /// - `UT_PREEMPT_INTERVAL_US` - timer period in microseconds
    /// - `UT_STACK_SIZE` - uthread stack size in bytes
    /// - `UT_ALTSTACK_SIZE` - alternate signal stack size in bytes
    /// - `UT_CLEANUP_STACK_SIZE` - cleanup stack size in bytes
    /// - `UT_IDLE_SLEEP_US` - idle worker sleep in microseconds
    /// - `UT_JOIN_SPINS` - spins before join yields
    /// - `UT_DEBUG` - debug logging (0/1)
    pub fn from_env() -> Self {
        Self {
            num_workers: resolve_workers(env_get("UT_NUM_WORKERS", defaults::NUM_WORKERS)),
            preempt_interval: Duration::from_micros(env_get(
                "UT_PREEMPT_INTERVAL_US",
                defaults::PREEMPT_INTERVAL_US,
            )),
            stack_size: env_get("UT_STACK_SIZE", defaults::STACK_SIZE),
            altstack_size: env_get("UT_ALTSTACK_SIZE", defaults::ALTSTACK_SIZE),
            cleanup_stack_size: env_get("UT_CLEANUP_STACK_SIZE", defaults::CLEANUP_STACK_SIZE),
            idle_sleep: Duration::from_micros(env_get("UT_IDLE_SLEEP_US", defaults::IDLE_SLEEP_US)),
            join_spins: env_get("UT_JOIN_SPINS", defaults::JOIN_SPINS),
            debug_logging: env_get_bool("UT_DEBUG", defaults::DEBUG_LOGGING),
        }
    }

    /// Compile-time defaults only, ignoring the environment
    pub fn new() -> Self {
        Self {
            num_workers: resolve_workers(defaults::NUM_WORKERS),
            preempt_interval: Duration::from_micros(defaults::PREEMPT_INTERVAL_US),
            stack_size: defaults::STACK_SIZE,
            altstack_size: defaults::ALTSTACK_SIZE,
            cleanup_stack_size: defaults::CLEANUP_STACK_SIZE,
            idle_sleep: Duration::from_micros(defaults::IDLE_SLEEP_US),
            join_spins: defaults::JOIN_SPINS,
            debug_logging: defaults::DEBUG_LOGGING,
        }
    }

    // Builder methods

    /// Set the worker count; 0 means one per online core
    pub fn num_workers(mut self, n: usize) -> Self {
        self.num_workers = resolve_workers(n);
        self
    }

    pub fn preempt_interval(mut self, d: Duration) -> Self {
        self.preempt_interval = d;
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = size;
        self
    }

    pub fn altstack_size(mut self, size: usize) -> Self {
        self.altstack_size = size;
        self
    }

    pub fn cleanup_stack_size(mut self, size: usize) -> Self {
        self.cleanup_stack_size = size;
        self
    }

    pub fn idle_sleep(mut self, d: Duration) -> Self {
        self.idle_sleep = d;
        self
    }

    pub fn join_spins(mut self, spins: u32) -> Self {
        self.join_spins = spins;
        self
    }

    pub fn debug_logging(mut self, enable: bool) -> Self {
        self.debug_logging = enable;
        self
    }

    /// Validate configuration and return the first problem found
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_workers == 0 {
            return Err(ConfigError::InvalidValue("num_workers must be > 0"));
        }
        if self.num_workers > MAX_WORKERS {
            return Err(ConfigError::InvalidValue("num_workers must be <= 256"));
        }
        if self.preempt_interval < MIN_PREEMPT_INTERVAL {
            return Err(ConfigError::InvalidValue("preempt_interval must be >= 50us"));
        }
        if self.stack_size < MIN_STACK_SIZE {
            return Err(ConfigError::InvalidValue("stack_size must be >= 64KB"));
        }
        if self.altstack_size < MIN_ALTSTACK_SIZE {
            return Err(ConfigError::InvalidValue("altstack_size must be >= 16KB"));
        }
        if self.cleanup_stack_size < MIN_ALTSTACK_SIZE {
            return Err(ConfigError::InvalidValue("cleanup_stack_size must be >= 16KB"));
        }
        Ok(())
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        kprintln!("uthread configuration:");
        kprintln!("  num_workers:         {}", self.num_workers);
        kprintln!("  preempt_interval:    {:?}", self.preempt_interval);
        kprintln!("  stack_size:          {}", self.stack_size);
        kprintln!("  altstack_size:       {}", self.altstack_size);
        kprintln!("  cleanup_stack_size:  {}", self.cleanup_stack_size);
        kprintln!("  idle_sleep:          {:?}", self.idle_sleep);
        kprintln!("  join_spins:          {}", self.join_spins);
        kprintln!("  debug_logging:       {}", self.debug_logging);
    }
}
