//! uthread identifier type

use core::fmt;

/// Unique identifier for a uthread
///
/// Ids are handed out from a monotonically increasing 64-bit counter and
/// never reused. The value 0 is reserved for the per-worker anchor node,
/// which is never visible through the public API.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct UThreadId(u64);

impl UThreadId {
    /// Id carried by every worker's anchor node
    pub const ANCHOR: UThreadId = UThreadId(0);

    /// First id handed to a user uthread
    pub const FIRST: u64 = 1;

    /// Create a new UThreadId from a raw value
    #[inline]
    pub const fn new(id: u64) -> Self {
        UThreadId(id)
    }

    /// Get the raw u64 value
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Check if this is the anchor sentinel
    #[inline]
    pub const fn is_anchor(self) -> bool {
        self.0 == 0
    }
}

impl From<u64> for UThreadId {
    #[inline]
    fn from(id: u64) -> Self {
        UThreadId(id)
    }
}

impl From<UThreadId> for u64 {
    #[inline]
    fn from(id: UThreadId) -> Self {
        id.0
    }
}

impl fmt::Debug for UThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_anchor() {
            write!(f, "UThreadId(ANCHOR)")
        } else {
            write!(f, "UThreadId({})", self.0)
        }
    }
}

impl fmt::Display for UThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_anchor() {
            write!(f, "anchor")
        } else {
            write!(f, "{}", self.0)
        }
    }
}
