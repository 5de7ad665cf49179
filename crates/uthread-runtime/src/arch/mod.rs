//! Architecture-specific machine context
//!
//! The scheduler switches uthreads by rewriting the `ucontext_t` the kernel
//! hands to the signal handler, so this layer knows the signal frame layout
//! and how to build a first frame for a fresh uthread.

cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "x86_64", target_os = "linux"))] {
        pub mod x86_64;
        pub use x86_64::*;
    } else {
        compile_error!("uthread-runtime supports only x86_64 Linux");
    }
}
