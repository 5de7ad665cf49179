//! Kernel-style print macros for uthread
//!
//! Output is formatted into a fixed stack buffer and written to fd 2 with a
//! single `write(2)`. Nothing allocates and no lock is taken, so a line can
//! be emitted from a uthread that gets preempted mid-call, or from a
//! context that interrupted another print, without deadlocking. Lines
//! longer than the buffer are truncated.
//!
//! # Environment Variables
//!
//! - `UT_LOG_LEVEL=<level>` - 0=off, 1=error, 2=warn, 3=info, 4=debug, 5=trace
//!   (names accepted too)
//! - `UT_LOG_TIME=1` - Prefix each leveled line with seconds since `init()`
//!
//! Call `init()` before the first worker starts; the runtime does this.
//! Lazy initialization reads the environment, which is not safe from a
//! signal handler.
//!
//! # Usage
//!
//! ```ignore
//! use uthread_core::{kdebug, kinfo, kprintln};
//!
//! kprintln!("Simple message");
//! kinfo!("Worker {} started", id);
//! kdebug!("picked uthread {}", next);
//! ```

use core::cell::Cell;
use core::fmt::{self, Write as _};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

/// Log levels (matches common conventions)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Off,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    /// Parse a level name or number; unknown strings give `None`
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "0" => Some(LogLevel::Off),
            "error" | "1" => Some(LogLevel::Error),
            "warn" | "2" => Some(LogLevel::Warn),
            "info" | "3" => Some(LogLevel::Info),
            "debug" | "4" => Some(LogLevel::Debug),
            "trace" | "5" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            LogLevel::Off => "",
            LogLevel::Error => "[ERROR]",
            LogLevel::Warn => "[WARN] ",
            LogLevel::Info => "[INFO] ",
            LogLevel::Debug => "[DEBUG]",
            LogLevel::Trace => "[TRACE]",
        }
    }
}

/// Capacity of one formatted line, newline included
pub const LINE_CAPACITY: usize = 512;

const NO_WORKER: usize = usize::MAX;
const NO_UTHREAD: u64 = u64::MAX;

static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);
static TIME_ENABLED: AtomicBool = AtomicBool::new(false);
static INITIALIZED: AtomicBool = AtomicBool::new(false);
static START: OnceLock<Instant> = OnceLock::new();

thread_local! {
    static WORKER_ID: Cell<usize> = const { Cell::new(NO_WORKER) };
    static UTHREAD_ID: Cell<u64> = const { Cell::new(NO_UTHREAD) };
}

/// Initialize logging from environment variables
pub fn init() {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    START.get_or_init(Instant::now);

    if let Ok(val) = std::env::var("UT_LOG_LEVEL") {
        let level = LogLevel::parse(&val).unwrap_or(LogLevel::Info);
        LOG_LEVEL.store(level as u8, Ordering::Relaxed);
    }

    if let Ok(val) = std::env::var("UT_LOG_TIME") {
        let on = matches!(val.as_str(), "1" | "true" | "yes" | "on");
        TIME_ENABLED.store(on, Ordering::Relaxed);
    }
}

/// Get current log level
#[inline]
pub fn log_level() -> LogLevel {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Set log level programmatically
pub fn set_log_level(level: LogLevel) {
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Enable or disable the elapsed-time prefix
pub fn set_time_enabled(enabled: bool) {
    START.get_or_init(Instant::now);
    TIME_ENABLED.store(enabled, Ordering::Relaxed);
}

/// Check if a log level is enabled
#[inline]
pub fn level_enabled(level: LogLevel) -> bool {
    level != LogLevel::Off && level as u8 <= log_level() as u8
}

/// Tag lines from this OS thread with a worker index
pub fn set_worker_id(index: usize) {
    WORKER_ID.with(|c| c.set(index));
}

/// Tag lines from this OS thread with the uthread now running on it.
/// The scheduler calls this on every switch.
#[inline]
pub fn set_uthread_id(id: u64) {
    UTHREAD_ID.with(|c| c.set(id));
}

/// Fixed-capacity line buffer; writes past the end are dropped
pub struct LineBuf {
    buf: [u8; LINE_CAPACITY],
    len: usize,
}

impl LineBuf {
    pub const fn new() -> Self {
        LineBuf { buf: [0; LINE_CAPACITY], len: 0 }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append a newline, overwriting the last byte when full
    pub fn terminate(&mut self) {
        if self.len == LINE_CAPACITY {
            self.buf[LINE_CAPACITY - 1] = b'\n';
        } else {
            self.buf[self.len] = b'\n';
            self.len += 1;
        }
    }
}

impl Default for LineBuf {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Write for LineBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = LINE_CAPACITY - self.len;
        let n = s.len().min(room);
        self.buf[self.len..self.len + n].copy_from_slice(&s.as_bytes()[..n]);
        self.len += n;
        // Never report an error: a truncated line beats a lost one
        Ok(())
    }
}

fn write_context(line: &mut LineBuf) {
    let worker = WORKER_ID.with(|c| c.get());
    if worker == NO_WORKER {
        return;
    }
    let _ = match UTHREAD_ID.with(|c| c.get()) {
        0 => write!(line, "[w{}:anchor] ", worker),
        NO_UTHREAD => write!(line, "[w{}] ", worker),
        id => write!(line, "[w{}:u{}] ", worker, id),
    };
}

fn emit(line: &LineBuf) {
    #[cfg(unix)]
    {
        use std::io::Write as _;
        use std::mem::ManuallyDrop;
        use std::os::fd::FromRawFd;

        // Safety: fd 2 stays open for the life of the process and the
        // ManuallyDrop keeps us from closing it
        let mut stderr = ManuallyDrop::new(unsafe { std::fs::File::from_raw_fd(2) });
        let _ = stderr.write_all(line.as_bytes());
    }
    #[cfg(not(unix))]
    {
        eprint!("{}", String::from_utf8_lossy(line.as_bytes()));
    }
}

/// Internal: format a leveled line without emitting it
#[doc(hidden)]
pub fn _format_leveled(line: &mut LineBuf, level: LogLevel, args: fmt::Arguments<'_>) {
    let _ = write!(line, "{} ", level.prefix());
    if TIME_ENABLED.load(Ordering::Relaxed) {
        if let Some(start) = START.get() {
            let _ = write!(line, "{:>10.6} ", start.elapsed().as_secs_f64());
        }
    }
    write_context(line);
    let _ = line.write_fmt(args);
    line.terminate();
}

/// Internal: write without newline
#[doc(hidden)]
pub fn _kprint_impl(args: fmt::Arguments<'_>) {
    let mut line = LineBuf::new();
    let _ = line.write_fmt(args);
    emit(&line);
}

/// Internal: write with newline
#[doc(hidden)]
pub fn _kprintln_impl(args: fmt::Arguments<'_>) {
    let mut line = LineBuf::new();
    let _ = line.write_fmt(args);
    line.terminate();
    emit(&line);
}

/// Internal: leveled print
#[doc(hidden)]
pub fn _klog_impl(level: LogLevel, args: fmt::Arguments<'_>) {
    if !level_enabled(level) {
        return;
    }
    let mut line = LineBuf::new();
    _format_leveled(&mut line, level, args);
    emit(&line);
}

// ============================================================================
// Public Macros
// ============================================================================

/// Print to stderr (no newline) with a single write
#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => {{
        $crate::kprint::_kprint_impl(format_args!($($arg)*));
    }};
}

/// Print to stderr with newline, with a single write
#[macro_export]
macro_rules! kprintln {
    () => {{
        $crate::kprint::_kprintln_impl(format_args!(""));
    }};
    ($($arg:tt)*) => {{
        $crate::kprint::_kprintln_impl(format_args!($($arg)*));
    }};
}

/// Error level log (always shown unless logging is off)
#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl(
            $crate::kprint::LogLevel::Error,
            format_args!($($arg)*)
        );
    }};
}

/// Warning level log
#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl(
            $crate::kprint::LogLevel::Warn,
            format_args!($($arg)*)
        );
    }};
}

/// Info level log
#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl(
            $crate::kprint::LogLevel::Info,
            format_args!($($arg)*)
        );
    }};
}

/// Debug level log
#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl(
            $crate::kprint::LogLevel::Debug,
            format_args!($($arg)*)
        );
    }};
}

/// Trace level log (most verbose)
#[macro_export]
macro_rules! ktrace {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl(
            $crate::kprint::LogLevel::Trace,
            format_args!($($arg)*)
        );
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_levels() {
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Trace);
        assert_eq!(LogLevel::from_u8(99), LogLevel::Trace);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!(LogLevel::parse("DEBUG"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse(" 2 "), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("loud"), None);
    }

    #[test]
    fn test_line_buf_truncates() {
        let mut line = LineBuf::new();
        for _ in 0..100 {
            let _ = write!(line, "0123456789");
        }
        assert_eq!(line.len(), LINE_CAPACITY);
        line.terminate();
        assert_eq!(line.len(), LINE_CAPACITY);
        assert_eq!(line.as_bytes()[LINE_CAPACITY - 1], b'\n');
    }

    #[test]
    fn test_leveled_line_has_context() {
        // Runs on its own test thread, so the TLS tags don't leak
        set_worker_id(3);
        set_uthread_id(17);
        let mut line = LineBuf::new();
        _format_leveled(&mut line, LogLevel::Warn, format_args!("x={}", 5));
        let text = std::str::from_utf8(line.as_bytes()).unwrap();
        assert!(text.starts_with("[WARN] "));
        assert!(text.ends_with("[w3:u17] x=5\n"));

        set_uthread_id(0);
        let mut line = LineBuf::new();
        _format_leveled(&mut line, LogLevel::Error, format_args!("idle"));
        let text = std::str::from_utf8(line.as_bytes()).unwrap();
        assert!(text.ends_with("[w3:anchor] idle\n"));
    }

    #[test]
    fn test_macros_compile() {
        assert!(!level_enabled(LogLevel::Off));
        kprint!("");
        kerror!("error {}", "msg");
        kwarn!("warn");
        ktrace!("trace {}", 1);
    }
}
