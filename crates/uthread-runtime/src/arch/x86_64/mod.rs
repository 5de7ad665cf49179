//! x86_64 Linux machine context
//!
//! A `MachineContext` is a copy of what the kernel saved in a signal frame:
//! the 23 general register slots of `mcontext_t` and the FPU/vector area
//! that `uc_mcontext.fpregs` points at. Switching uthreads is copying one
//! of these out of the live frame and another one in; `sigreturn` then
//! loads the new registers.
//!
//! The FPU area is an XSAVE image when the kernel uses XSAVE (detected by
//! the `fpx_sw_bytes` magic in the FXSAVE software-reserved bytes) and a
//! plain 512-byte FXSAVE image otherwise.

use core::ptr;
use std::arch::naked_asm;

const GREG_COUNT: usize = 23;

const REG_RDI: usize = libc::REG_RDI as usize;
const REG_RBP: usize = libc::REG_RBP as usize;
const REG_RSP: usize = libc::REG_RSP as usize;
const REG_RIP: usize = libc::REG_RIP as usize;
const REG_EFL: usize = libc::REG_EFL as usize;
const REG_CSGSFS: usize = libc::REG_CSGSFS as usize;

/// IF set, reserved bit 1 set
const INITIAL_RFLAGS: i64 = 0x202;
/// All x87 exceptions masked, 64-bit precision, round to nearest
const INITIAL_FCW: u16 = 0x037f;
/// All SSE exceptions masked, round to nearest
const INITIAL_MXCSR: u32 = 0x1f80;

/// x87 control word, x87/SSE registers: everything FXSAVE defines
const LEGACY_LEN: usize = 416;
const FXSAVE_LEN: usize = 512;
const FCW_OFFSET: usize = 0;
const MXCSR_OFFSET: usize = 24;
const SW_MAGIC_OFFSET: usize = 464;
const SW_XSTATE_SIZE_OFFSET: usize = 480;
const XSTATE_BV_OFFSET: usize = 512;
const FP_XSTATE_MAGIC1: u32 = 0x4650_5853;

const XFEATURE_X87_SSE: u64 = 0b11;
/// AVX, AVX-512 opmask, ZMM_Hi256, Hi16_ZMM
const XFEATURE_WIDE_VECTORS: u64 = (1 << 2) | (1 << 5) | (1 << 6) | (1 << 7);

/// Largest XSAVE image kept per uthread. AVX-512 machines need about
/// 2.7KB; bigger images fall back to the legacy area only.
pub const FPU_CAPACITY: usize = 4096;

#[repr(C, align(64))]
struct FpuArea([u8; FPU_CAPACITY]);

/// Saved register state of a sleeping uthread
#[repr(C)]
pub struct MachineContext {
    gregs: [i64; GREG_COUNT],
    /// Valid bytes in `fpu`; 0 for a context that has never run
    fpu_len: usize,
    fpu: FpuArea,
}

/// XSAVE image size of a kernel FPU frame, if it carries one
unsafe fn xstate_size(fp: *const u8) -> Option<usize> {
    let magic = ptr::read_unaligned(fp.add(SW_MAGIC_OFFSET) as *const u32);
    if magic != FP_XSTATE_MAGIC1 {
        return None;
    }
    let size = ptr::read_unaligned(fp.add(SW_XSTATE_SIZE_OFFSET) as *const u32) as usize;
    (size > FXSAVE_LEN).then_some(size)
}

impl MachineContext {
    pub const fn new() -> Self {
        MachineContext {
            gregs: [0; GREG_COUNT],
            fpu_len: 0,
            fpu: FpuArea([0; FPU_CAPACITY]),
        }
    }

    /// Build the first frame of a uthread
    ///
    /// Resuming it calls `entry(arg)` with the stack pointer just below a
    /// single return address pointing at `uthread_exit_trampoline`, so the
    /// function's `ret` lands in the exit path.
    ///
    /// # Safety
    ///
    /// `stack_top` must be the top of a writable stack of at least a page.
    pub unsafe fn prime(&mut self, stack_top: *mut u8, entry: usize, arg: usize) {
        // Function entry expects rsp % 16 == 8, as if just called
        let sp = ((stack_top as usize) & !0xF) - 8;
        *(sp as *mut usize) = uthread_exit_trampoline as usize;

        self.gregs = [0; GREG_COUNT];
        self.gregs[REG_RIP] = entry as i64;
        self.gregs[REG_RDI] = arg as i64;
        self.gregs[REG_RSP] = sp as i64;
        self.gregs[REG_RBP] = 0;
        self.gregs[REG_EFL] = INITIAL_RFLAGS;

        self.fpu.0[..FXSAVE_LEN].fill(0);
        self.fpu.0[FCW_OFFSET..FCW_OFFSET + 2].copy_from_slice(&INITIAL_FCW.to_le_bytes());
        self.fpu.0[MXCSR_OFFSET..MXCSR_OFFSET + 4].copy_from_slice(&INITIAL_MXCSR.to_le_bytes());
        self.fpu_len = 0;
    }

    /// Copy the interrupted state out of a signal frame
    ///
    /// # Safety
    ///
    /// `uc` must be the live `ucontext_t` of the running signal handler.
    pub unsafe fn capture(&mut self, uc: *const libc::ucontext_t) {
        let mc = &(*uc).uc_mcontext;
        self.gregs = mc.gregs;

        let fp = mc.fpregs as *const u8;
        if fp.is_null() {
            self.fpu_len = 0;
            return;
        }
        let len = match xstate_size(fp) {
            Some(n) if n <= FPU_CAPACITY => n,
            _ => FXSAVE_LEN,
        };
        ptr::copy_nonoverlapping(fp, self.fpu.0.as_mut_ptr(), len);
        self.fpu_len = len;
    }

    /// Overwrite a signal frame so `sigreturn` resumes this context
    ///
    /// The frame's segment word, signal mask and `uc_stack` stay as they
    /// are: every context on a worker shares the thread and its
    /// alternate stack.
    ///
    /// # Safety
    ///
    /// `uc` must be the live `ucontext_t` of the running signal handler.
    pub unsafe fn restore(&self, uc: *mut libc::ucontext_t) {
        let mc = &mut (*uc).uc_mcontext;
        let csgsfs = mc.gregs[REG_CSGSFS];
        mc.gregs = self.gregs;
        mc.gregs[REG_CSGSFS] = csgsfs;

        let fp = mc.fpregs as *mut u8;
        if fp.is_null() {
            return;
        }

        let live_size = xstate_size(fp);
        if self.fpu_len > FXSAVE_LEN && live_size == Some(self.fpu_len) {
            ptr::copy_nonoverlapping(self.fpu.0.as_ptr(), fp, self.fpu_len);
            return;
        }

        ptr::copy_nonoverlapping(self.fpu.0.as_ptr(), fp, LEGACY_LEN);
        if live_size.is_some() {
            // Make XRSTOR take x87/SSE from the legacy area we just wrote;
            // a fresh context starts with wide vector state in init form
            let bv = fp.add(XSTATE_BV_OFFSET) as *mut u64;
            let mut v = ptr::read_unaligned(bv) | XFEATURE_X87_SSE;
            if self.fpu_len == 0 {
                v &= !XFEATURE_WIDE_VECTORS;
            }
            ptr::write_unaligned(bv, v);
        }
    }

    /// Saved instruction pointer
    #[inline]
    pub fn ip(&self) -> usize {
        self.gregs[REG_RIP] as usize
    }

    /// Saved stack pointer
    #[inline]
    pub fn sp(&self) -> usize {
        self.gregs[REG_RSP] as usize
    }
}

impl Default for MachineContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Continuation of every uthread entry function
///
/// Reached by `ret` with the return value in rax:
/// 1. `uthread_exit_prepare(rax)` on the uthread stack masks preemption,
///    stores the value and returns the worker's cleanup-stack top
/// 2. switch to the cleanup stack and call `uthread_exit_finish`, which
///    releases the uthread stack and hands the CPU back to the scheduler
#[unsafe(naked)]
pub unsafe extern "C" fn uthread_exit_trampoline() {
    naked_asm!(
        "mov rdi, rax",
        "and rsp, -16",
        "call {prepare}",
        "mov rsp, rax",
        "and rsp, -16",
        "call {finish}",
        "ud2",
        prepare = sym crate::scheduler::uthread_exit_prepare,
        finish = sym crate::scheduler::uthread_exit_finish,
    );
}
