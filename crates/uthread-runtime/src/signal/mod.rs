//! Signal plumbing for preemption
//!
//! `SIGALRM` ticks from a process-wide interval timer are funnelled to a
//! master thread, which relays them as `SIGUSR1` to every worker. The
//! `SIGUSR1` handler is the scheduler.

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        pub use unix::*;
    } else {
        compile_error!("uthread-runtime needs unix signals");
    }
}
