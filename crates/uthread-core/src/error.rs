//! Error types for the uthread runtime

use core::fmt;

/// Result type for runtime operations
pub type SchedResult<T> = Result<T, SchedError>;

/// Errors that can occur in runtime operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedError {
    /// No live uthread with this id in the handle's worker queue
    UThreadNotFound,

    /// The uthread was already joined, or a join is in progress
    AlreadyJoined,

    /// The uthread was detached; its result is not available
    Detached,

    /// The uthread's entry function panicked
    UThreadPanicked,

    /// Runtime already initialized
    AlreadyInitialized,

    /// Memory allocation/mapping failed
    MemoryError(MemoryError),

    /// Worker thread error
    WorkerError(WorkerError),

    /// Invalid configuration
    ConfigError(ConfigError),

    /// Platform-specific error (errno)
    PlatformError(i32),
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedError::UThreadNotFound => write!(f, "uthread not found"),
            SchedError::AlreadyJoined => write!(f, "uthread already joined"),
            SchedError::Detached => write!(f, "uthread is detached"),
            SchedError::UThreadPanicked => write!(f, "uthread panicked"),
            SchedError::AlreadyInitialized => write!(f, "runtime already initialized"),
            SchedError::MemoryError(e) => write!(f, "memory error: {}", e),
            SchedError::WorkerError(e) => write!(f, "worker error: {}", e),
            SchedError::ConfigError(e) => write!(f, "config error: {}", e),
            SchedError::PlatformError(code) => write!(f, "platform error: {}", code),
        }
    }
}

impl std::error::Error for SchedError {}

/// Memory-related errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// The memory provider could not satisfy the request
    AllocationFailed,

    /// Returning memory to the provider failed
    ReleaseFailed,

    /// Zero-sized or overflowing request
    InvalidSize,
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::AllocationFailed => write!(f, "memory allocation failed"),
            MemoryError::ReleaseFailed => write!(f, "memory release failed"),
            MemoryError::InvalidSize => write!(f, "invalid allocation size"),
        }
    }
}

impl From<MemoryError> for SchedError {
    fn from(e: MemoryError) -> Self {
        SchedError::MemoryError(e)
    }
}

/// Worker thread related errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// Failed to spawn worker or master thread
    SpawnFailed,

    /// sigaction / sigaltstack / pthread_sigmask failed
    SignalSetupFailed,

    /// setitimer failed
    TimerSetupFailed,

    /// The master thread died before reporting startup
    StartupAborted,
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerError::SpawnFailed => write!(f, "failed to spawn runtime thread"),
            WorkerError::SignalSetupFailed => write!(f, "signal setup failed"),
            WorkerError::TimerSetupFailed => write!(f, "preemption timer setup failed"),
            WorkerError::StartupAborted => write!(f, "runtime startup aborted"),
        }
    }
}

impl From<WorkerError> for SchedError {
    fn from(e: WorkerError) -> Self {
        SchedError::WorkerError(e)
    }
}

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for SchedError {
    fn from(e: ConfigError) -> Self {
        SchedError::ConfigError(e)
    }
}
