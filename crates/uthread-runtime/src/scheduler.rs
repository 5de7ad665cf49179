//! Scheduler and uthread lifecycle
//!
//! The scheduler is the SIGUSR1 handler. It runs on the interrupted
//! worker's alternate stack, saves the interrupted context into the
//! current control block, picks the next SLEEPING block after it in the
//! run queue and writes that block's context over the signal frame.
//! Returning from the handler resumes the chosen uthread.
//!
//! The runtime is a process-wide singleton started on first use and never
//! torn down.

use core::hint;
use core::ptr;
use std::panic;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;

use uthread_core::error::{SchedError, SchedResult, WorkerError};
use uthread_core::kprint::{self, LogLevel};
use uthread_core::traits::MemoryProvider;
use uthread_core::{kdebug, ktrace, kwarn};
use uthread_core::{Disposition, UThreadId, UThreadState};

use crate::config::RuntimeConfig;
use crate::gcb::{EntryFn, Gcb, ResultDrop};
use crate::memory::DEFAULT_PROVIDER;
use crate::queue;
use crate::signal::{self, PreemptGuard};
use crate::tls;
use crate::worker::{Startup, Worker};

static RUNTIME: OnceLock<SchedResult<Runtime>> = OnceLock::new();

/// Handle to a created uthread: its id and the worker whose queue holds it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UThread {
    id: UThreadId,
    worker: usize,
}

impl UThread {
    #[inline]
    pub fn id(&self) -> UThreadId {
        self.id
    }

    #[inline]
    pub fn worker(&self) -> usize {
        self.worker
    }
}

pub struct Runtime {
    config: RuntimeConfig,
    workers: &'static [Worker],
    provider: &'static dyn MemoryProvider,
    next_id: AtomicU64,
    next_worker: AtomicUsize,
}

impl Runtime {
    fn start(config: RuntimeConfig, provider: &'static dyn MemoryProvider) -> SchedResult<Runtime> {
        kprint::init();
        let debug = config.debug_logging || cfg!(feature = "debug-logging");
        if debug {
            kprint::set_log_level(LogLevel::Debug);
        }
        config.validate()?;

        let workers = (0..config.num_workers)
            .map(|i| Worker::new(i, &config, provider))
            .collect::<SchedResult<Vec<_>>>()?;
        let workers: &'static [Worker] = Box::leak(workers.into_boxed_slice());

        signal::install_handlers()?;

        let startup = Arc::new(Startup::default());
        for worker in workers {
            worker.spawn(Arc::clone(&startup))?;
        }

        let (tx, rx) = mpsc::channel();
        let interval = config.preempt_interval;
        thread::Builder::new()
            .name("uthread-master".into())
            .spawn(move || master_main(workers, startup, interval, tx))
            .map_err(|_| WorkerError::SpawnFailed)?;
        rx.recv().map_err(|_| WorkerError::StartupAborted)??;

        kdebug!(
            "runtime started: {} workers, {:?} tick, {} provider",
            workers.len(),
            interval,
            provider.name()
        );
        if debug {
            config.print();
        }

        Ok(Runtime {
            config,
            workers,
            provider,
            next_id: AtomicU64::new(UThreadId::FIRST),
            next_worker: AtomicUsize::new(0),
        })
    }

    #[inline]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    #[inline]
    pub fn workers(&self) -> &'static [Worker] {
        self.workers
    }

    /// Allocate, prime and enqueue a uthread running `entry(arg)`
    pub fn create(&self, entry: EntryFn, arg: usize, result_drop: Option<ResultDrop>) -> SchedResult<UThread> {
        let id = UThreadId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let index = self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        let worker = &self.workers[index];

        let gcb = {
            let _guard = PreemptGuard::new();
            Gcb::new_uthread(self.provider, id, index, entry, arg, result_drop, self.config.stack_size)?
        };
        queue::enqueue(worker.anchor(), gcb);
        ktrace!("created uthread {} on worker {}", id, index);

        Ok(UThread { id, worker: index })
    }

    /// Wait for a uthread to finish and take its return value
    pub fn join(&self, handle: UThread) -> SchedResult<usize> {
        let worker = self.workers.get(handle.worker).ok_or(SchedError::UThreadNotFound)?;

        let gcb: *const Gcb = {
            let pin = worker.pin();
            let g = worker.find(handle.id, &pin).ok_or(SchedError::UThreadNotFound)?;
            g.claim(Disposition::Joining).map_err(claim_error)?;
            g
        };
        // Safety: a JOINING block is never reclaimed before we store JOINED
        let g = unsafe { &*gcb };

        let mut spins = 0u32;
        while g.state() != UThreadState::Joinable {
            if spins < self.config.join_spins {
                spins += 1;
                hint::spin_loop();
            } else {
                thread::yield_now();
            }
        }

        // Safety: JOINABLE was observed with Acquire
        let value = unsafe { g.load_ret() };
        let panicked = g.panicked();
        g.set_state(UThreadState::Joined);

        if panicked {
            return Err(SchedError::UThreadPanicked);
        }
        Ok(value)
    }

    /// Give up the result; the worker frees the uthread once it finishes
    pub fn detach(&self, handle: UThread) -> SchedResult<()> {
        let worker = self.workers.get(handle.worker).ok_or(SchedError::UThreadNotFound)?;
        let pin = worker.pin();
        let g = worker.find(handle.id, &pin).ok_or(SchedError::UThreadNotFound)?;
        g.claim(Disposition::Detached).map_err(claim_error)
    }
}

fn claim_error(current: Disposition) -> SchedError {
    match current {
        Disposition::Detached => SchedError::Detached,
        Disposition::Joining | Disposition::Attached => SchedError::AlreadyJoined,
    }
}

fn master_setup(workers: &'static [Worker], startup: &Startup, interval: Duration) -> SchedResult<()> {
    signal::configure_master_mask()?;

    // The timer must not fire before every worker can take SIGUSR1
    while startup.ready() < workers.len() {
        if startup.failed() {
            return Err(WorkerError::SignalSetupFailed.into());
        }
        thread::sleep(Duration::from_micros(100));
    }

    let pthreads = workers.iter().map(Worker::pthread).collect();
    signal::publish_relay(signal::current_pthread(), pthreads)?;
    signal::arm_timer(interval)
}

fn master_main(
    workers: &'static [Worker],
    startup: Arc<Startup>,
    interval: Duration,
    report: Sender<SchedResult<()>>,
) {
    let result = master_setup(workers, &startup, interval);
    let armed = result.is_ok();
    let _ = report.send(result);
    if !armed {
        return;
    }
    kdebug!("master relaying ticks every {:?}", interval);
    loop {
        thread::park();
    }
}

// ============================================================================
// Signal handler
// ============================================================================

pub(crate) extern "C" fn preempt_handler(
    _sig: libc::c_int,
    _info: *mut libc::siginfo_t,
    uctx: *mut libc::c_void,
) {
    let Some(worker) = tls::current_worker() else {
        return;
    };
    // Safety: uctx is the frame the kernel built for this handler and the
    // worker is bound to this thread
    unsafe { schedule(worker, uctx as *mut libc::ucontext_t) }
}

unsafe fn schedule(worker: &Worker, uc: *mut libc::ucontext_t) {
    // errno is per OS thread, so it belongs to the context, not the worker
    let errno = libc::__errno_location();

    let cur = worker.current();
    if cur.state() == UThreadState::Running {
        (*cur.ctx()).capture(uc);
        cur.save_errno(*errno);
        cur.set_state(UThreadState::Sleeping);
    }

    let next = pick_next(worker, cur);
    next.set_state(UThreadState::Running);
    worker.set_current(next);
    (*next.ctx()).restore(uc);
    *errno = next.saved_errno();
    kprint::set_uthread_id(next.id().as_u64());
}

/// First SLEEPING block after `cur`, wrapping around; the anchor if none
unsafe fn pick_next<'a>(worker: &'a Worker, cur: &'a Gcb) -> &'a Gcb {
    let mut p = cur.next.load(Ordering::Acquire);
    while !ptr::eq(p, cur) {
        let g = &*p;
        if g.state() == UThreadState::Sleeping {
            return g;
        }
        p = g.next.load(Ordering::Acquire);
    }
    worker.anchor()
}

// ============================================================================
// Entry and exit
// ============================================================================

/// First code a uthread runs; the primed context calls it with the block
pub(crate) extern "C" fn uthread_entry(gcb: *const Gcb) -> usize {
    // Safety: the block outlives its own execution
    let gcb = unsafe { &*gcb };
    let (entry, arg) = gcb.entry();
    match panic::catch_unwind(move || entry(arg)) {
        Ok(value) => value,
        Err(_) => {
            gcb.mark_panicked();
            0
        }
    }
}

/// Exit path, still on the uthread stack
///
/// Masks preemption until `uthread_exit_finish` hands the CPU back, so the
/// per-worker cleanup stack never has two users.
pub(crate) extern "C" fn uthread_exit_prepare(ret: usize) -> *mut u8 {
    signal::block_preempt();
    let Some(worker) = tls::current_worker() else {
        std::process::abort();
    };
    // Safety: this is the cleanup path of the current uthread
    unsafe { worker.current().store_ret(ret) };
    worker.cleanup_stack_top()
}

/// Exit path, on the cleanup stack
pub(crate) extern "C" fn uthread_exit_finish() -> ! {
    let Some(worker) = tls::current_worker() else {
        std::process::abort();
    };
    let gcb = worker.current();

    // Safety: nothing runs on the uthread stack any more
    if let Some(stack) = unsafe { gcb.take_stack() } {
        if let Err(e) = unsafe { stack.release(worker.provider()) } {
            kwarn!("uthread {}: stack release failed: {}", gcb.id(), e);
        }
    }
    ktrace!("uthread {} finished", gcb.id());

    // Last write: a joiner may take the value from here on
    gcb.set_state(UThreadState::Joinable);

    // Pending until the unmask, then the scheduler switches away for good
    signal::raise_preempt();
    signal::unblock_preempt();
    loop {
        hint::spin_loop();
    }
}

// ============================================================================
// Global runtime
// ============================================================================

/// Start the runtime with `config` and the default mmap provider
pub fn init(config: RuntimeConfig) -> SchedResult<()> {
    init_with_provider(config, &DEFAULT_PROVIDER)
}

/// Start the runtime with `config`, taking uthread memory from `provider`
///
/// Fails with `AlreadyInitialized` if the runtime was already started,
/// explicitly or by a first `create`.
pub fn init_with_provider(config: RuntimeConfig, provider: &'static dyn MemoryProvider) -> SchedResult<()> {
    let mut started_here = false;
    let outcome = RUNTIME.get_or_init(|| {
        started_here = true;
        Runtime::start(config, provider)
    });
    if !started_here {
        return Err(SchedError::AlreadyInitialized);
    }
    outcome.as_ref().map(|_| ()).map_err(Clone::clone)
}

/// The runtime, started from the environment on first use
///
/// A failed start is cached and returned to every caller.
pub fn runtime() -> SchedResult<&'static Runtime> {
    RUNTIME
        .get_or_init(|| Runtime::start(RuntimeConfig::from_env(), &DEFAULT_PROVIDER))
        .as_ref()
        .map_err(Clone::clone)
}

/// The runtime if it started successfully, without starting it
pub fn try_runtime() -> Option<&'static Runtime> {
    RUNTIME.get().and_then(|r| r.as_ref().ok())
}

/// Create a uthread running `entry(arg)`
pub fn create(entry: EntryFn, arg: usize) -> SchedResult<UThread> {
    runtime()?.create(entry, arg, None)
}

/// Like `create`, with a destructor for the return value that runs if the
/// uthread is detached and finishes normally
pub fn create_with_drop(entry: EntryFn, arg: usize, result_drop: ResultDrop) -> SchedResult<UThread> {
    runtime()?.create(entry, arg, Some(result_drop))
}

/// Wait for `handle` to finish and return its value
pub fn join(handle: UThread) -> SchedResult<usize> {
    runtime()?.join(handle)
}

/// Let `handle` be reclaimed without a join
pub fn detach(handle: UThread) -> SchedResult<()> {
    runtime()?.detach(handle)
}

/// Number of workers, 0 before the runtime starts
pub fn worker_count() -> usize {
    try_runtime().map_or(0, |rt| rt.workers.len())
}

/// Uthreads currently linked into `worker`'s queue
pub fn queue_len(worker: usize) -> Option<usize> {
    try_runtime()?.workers.get(worker).map(Worker::queue_len)
}

/// Id of the uthread running on this OS thread
pub fn current_id() -> Option<UThreadId> {
    let gcb = tls::current_worker()?.current();
    (!gcb.is_anchor()).then(|| gcb.id())
}

#[inline]
pub fn is_in_uthread() -> bool {
    current_id().is_some()
}
