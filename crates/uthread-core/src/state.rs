//! uthread lifecycle state and join/detach disposition

use core::fmt;

/// Lifecycle state of a uthread
///
/// ```text
/// Sleeping <-> Running  (scheduler, any number of times)
///     Running -> Joinable  (cleanup path, exactly once)
///     Joinable -> Joined   (join, exactly once; never for detached)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UThreadState {
    /// Has a saved context and is waiting to be picked by the scheduler
    Sleeping = 0,

    /// Currently executing on its worker
    Running = 1,

    /// Entry function returned; return value is published
    Joinable = 2,

    /// Return value was consumed by join; awaiting reclamation
    Joined = 3,
}

impl UThreadState {
    /// Check if the scheduler may switch to this uthread
    #[inline]
    pub const fn is_runnable(&self) -> bool {
        matches!(self, UThreadState::Sleeping)
    }

    /// Check if the entry function has returned
    #[inline]
    pub const fn is_finished(&self) -> bool {
        matches!(self, UThreadState::Joinable | UThreadState::Joined)
    }

    /// Position in the lifecycle order. Sleeping and Running share a rank:
    /// they alternate freely before the uthread finishes.
    #[inline]
    pub const fn rank(&self) -> u8 {
        match self {
            UThreadState::Sleeping | UThreadState::Running => 0,
            UThreadState::Joinable => 1,
            UThreadState::Joined => 2,
        }
    }

    /// Check if `self -> next` is a legal transition
    pub const fn can_transition_to(&self, next: UThreadState) -> bool {
        matches!(
            (*self, next),
            (UThreadState::Sleeping, UThreadState::Running)
                | (UThreadState::Running, UThreadState::Sleeping)
                // the scheduler may re-pick the context it just put to sleep
                | (UThreadState::Running, UThreadState::Running)
                | (UThreadState::Running, UThreadState::Joinable)
                | (UThreadState::Joinable, UThreadState::Joined)
        )
    }
}

impl From<u8> for UThreadState {
    fn from(v: u8) -> Self {
        match v {
            0 => UThreadState::Sleeping,
            1 => UThreadState::Running,
            2 => UThreadState::Joinable,
            _ => UThreadState::Joined,
        }
    }
}

impl From<UThreadState> for u8 {
    fn from(state: UThreadState) -> u8 {
        state as u8
    }
}

impl fmt::Display for UThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UThreadState::Sleeping => write!(f, "SLEEPING"),
            UThreadState::Running => write!(f, "RUNNING"),
            UThreadState::Joinable => write!(f, "JOINABLE"),
            UThreadState::Joined => write!(f, "JOINED"),
        }
    }
}

/// Who is responsible for a uthread's result
///
/// Starts as `Attached`. A join claims it (`Joining`) and a detach gives it
/// up (`Detached`); both claims are a single compare-and-swap from
/// `Attached`, so join and detach can never both succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Disposition {
    /// Nobody has claimed the result yet
    Attached = 0,

    /// A join call owns the result
    Joining = 1,

    /// Reclaimed straight from Joinable, never joined
    Detached = 2,
}

impl Disposition {
    #[inline]
    pub const fn is_detached(&self) -> bool {
        matches!(self, Disposition::Detached)
    }
}

impl From<u8> for Disposition {
    fn from(v: u8) -> Self {
        match v {
            0 => Disposition::Attached,
            1 => Disposition::Joining,
            _ => Disposition::Detached,
        }
    }
}

impl From<Disposition> for u8 {
    fn from(d: Disposition) -> u8 {
        d as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [UThreadState; 4] = [
        UThreadState::Sleeping,
        UThreadState::Running,
        UThreadState::Joinable,
        UThreadState::Joined,
    ];

    #[test]
    fn test_state_predicates() {
        assert!(UThreadState::Sleeping.is_runnable());
        assert!(!UThreadState::Running.is_runnable());
        assert!(!UThreadState::Joinable.is_runnable());

        assert!(UThreadState::Joinable.is_finished());
        assert!(UThreadState::Joined.is_finished());
        assert!(!UThreadState::Running.is_finished());
    }

    #[test]
    fn test_transitions_never_go_backward() {
        for from in ALL {
            for to in ALL {
                if from.can_transition_to(to) {
                    assert!(to.rank() >= from.rank(), "{} -> {} goes backward", from, to);
                }
            }
        }
    }

    #[test]
    fn test_terminal_transitions_happen_once() {
        // Joinable is only entered from Running, Joined only from Joinable
        for from in ALL {
            if from.can_transition_to(UThreadState::Joinable) {
                assert_eq!(from, UThreadState::Running);
            }
            if from.can_transition_to(UThreadState::Joined) {
                assert_eq!(from, UThreadState::Joinable);
            }
        }
        assert!(!UThreadState::Joined.can_transition_to(UThreadState::Joined));
        assert!(!UThreadState::Joinable.can_transition_to(UThreadState::Joinable));
        assert!(!UThreadState::Sleeping.can_transition_to(UThreadState::Joinable));
    }

    #[test]
    fn test_u8_roundtrip() {
        for s in ALL {
            assert_eq!(UThreadState::from(u8::from(s)), s);
        }
        assert_eq!(Disposition::from(u8::from(Disposition::Joining)), Disposition::Joining);
        assert!(Disposition::Detached.is_detached());
        assert!(!Disposition::Attached.is_detached());
    }
}
