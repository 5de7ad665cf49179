//! Unix signal handling: relay, masks and the interval timer

use core::ptr;
use std::sync::OnceLock;
use std::time::Duration;

use nix::sys::pthread::{pthread_kill, pthread_self, Pthread};
use nix::sys::signal::{pthread_sigmask, sigaction, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal};

use uthread_core::error::{SchedResult, WorkerError};

use crate::memory::Stack;

/// Delivered to one worker to run its scheduler
pub const PREEMPT_SIGNAL: Signal = Signal::SIGUSR1;

/// Delivered by the interval timer
pub const TICK_SIGNAL: Signal = Signal::SIGALRM;

/// Who the tick relay talks to
struct Relay {
    master: Pthread,
    workers: Box<[Pthread]>,
}

static RELAY: OnceLock<Relay> = OnceLock::new();

fn only(sig: Signal) -> SigSet {
    let mut set = SigSet::empty();
    set.add(sig);
    set
}

/// Install the scheduler and the tick relay handlers, process-wide
///
/// Both run with every signal masked and on the alternate stack when the
/// thread has one.
pub fn install_handlers() -> SchedResult<()> {
    let preempt = SigAction::new(
        SigHandler::SigAction(crate::scheduler::preempt_handler),
        SaFlags::SA_SIGINFO | SaFlags::SA_RESTART | SaFlags::SA_ONSTACK,
        SigSet::all(),
    );
    let tick = SigAction::new(
        SigHandler::Handler(relay_tick),
        SaFlags::SA_RESTART | SaFlags::SA_ONSTACK,
        SigSet::all(),
    );

    // Safety: both handlers only touch atomics, TLS and signal-safe calls
    unsafe {
        sigaction(PREEMPT_SIGNAL, &preempt).map_err(|_| WorkerError::SignalSetupFailed)?;
        sigaction(TICK_SIGNAL, &tick).map_err(|_| WorkerError::SignalSetupFailed)?;
    }
    Ok(())
}

/// SIGALRM handler
///
/// A tick can land on any thread that doesn't block SIGALRM. Anywhere but
/// the master it is forwarded to the master; on the master it becomes one
/// SIGUSR1 per worker.
extern "C" fn relay_tick(_: libc::c_int) {
    let Some(relay) = RELAY.get() else {
        return;
    };
    if pthread_self() != relay.master {
        let _ = pthread_kill(relay.master, TICK_SIGNAL);
        return;
    }
    for &worker in relay.workers.iter() {
        let _ = pthread_kill(worker, PREEMPT_SIGNAL);
    }
}

/// Publish the relay table; must happen before the timer is armed
pub fn publish_relay(master: Pthread, workers: Box<[Pthread]>) -> SchedResult<()> {
    RELAY
        .set(Relay { master, workers })
        .map_err(|_| WorkerError::SignalSetupFailed.into())
}

/// Arm `ITIMER_REAL` with a fixed period
pub fn arm_timer(interval: Duration) -> SchedResult<()> {
    let tv = libc::timeval {
        tv_sec: interval.as_secs() as libc::time_t,
        tv_usec: interval.subsec_micros() as libc::suseconds_t,
    };
    let it = libc::itimerval {
        it_interval: tv,
        it_value: tv,
    };
    let ret = unsafe { libc::setitimer(libc::ITIMER_REAL, &it, ptr::null_mut()) };
    if ret != 0 {
        return Err(WorkerError::TimerSetupFailed.into());
    }
    Ok(())
}

/// Point this thread's signal stack at `stack`
pub fn install_altstack(stack: &Stack) -> SchedResult<()> {
    let ss = libc::stack_t {
        ss_sp: stack.base() as *mut libc::c_void,
        ss_flags: 0,
        ss_size: stack.size(),
    };
    let ret = unsafe { libc::sigaltstack(&ss, ptr::null_mut()) };
    if ret != 0 {
        return Err(WorkerError::SignalSetupFailed.into());
    }
    Ok(())
}

/// Worker threads take SIGUSR1 and never SIGALRM
pub fn configure_worker_mask() -> SchedResult<()> {
    pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&only(TICK_SIGNAL)), None)
        .and_then(|_| pthread_sigmask(SigmaskHow::SIG_UNBLOCK, Some(&only(PREEMPT_SIGNAL)), None))
        .map_err(|_| WorkerError::SignalSetupFailed.into())
}

/// The master takes SIGALRM and never SIGUSR1
pub fn configure_master_mask() -> SchedResult<()> {
    pthread_sigmask(SigmaskHow::SIG_UNBLOCK, Some(&only(TICK_SIGNAL)), None)
        .and_then(|_| pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&only(PREEMPT_SIGNAL)), None))
        .map_err(|_| WorkerError::SignalSetupFailed.into())
}

/// Mask SIGUSR1 on this thread; true if it was deliverable before
pub fn block_preempt() -> bool {
    let mut old = SigSet::empty();
    let _ = pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&only(PREEMPT_SIGNAL)), Some(&mut old));
    !old.contains(PREEMPT_SIGNAL)
}

/// Unmask SIGUSR1; a pending one is delivered before this returns
pub fn unblock_preempt() {
    let _ = pthread_sigmask(SigmaskHow::SIG_UNBLOCK, Some(&only(PREEMPT_SIGNAL)), None);
}

/// Make this thread's scheduler run as soon as SIGUSR1 is deliverable
pub fn raise_preempt() {
    let _ = pthread_kill(pthread_self(), PREEMPT_SIGNAL);
}

#[inline]
pub fn current_pthread() -> Pthread {
    pthread_self()
}

/// Masks preemption for its lifetime; nests
pub struct PreemptGuard {
    unmask_on_drop: bool,
}

impl PreemptGuard {
    pub fn new() -> Self {
        PreemptGuard {
            unmask_on_drop: block_preempt(),
        }
    }
}

impl Default for PreemptGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PreemptGuard {
    fn drop(&mut self) {
        if self.unmask_on_drop {
            unblock_preempt();
        }
    }
}
