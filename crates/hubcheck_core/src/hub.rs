//! The cooperative scheduler ("hub") as seen by the harness.
//!
//! A hub multiplexes logical threads of control on a single OS thread and switches between them only at
//! suspension points. The harness needs a narrow view of it: the registration tables it inspects for leaks, a
//! timer facility for per-test deadlines, and a way to suspend once so pending cancellations can settle.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Handle to a timer scheduled on a hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Handle to a reader or writer registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

/// What a listener waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interest {
    Read,
    Write,
}

impl fmt::Display for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interest::Read => write!(f, "read"),
            Interest::Write => write!(f, "write"),
        }
    }
}

/// A reader or writer registration held by the hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listener {
    pub id: ListenerId,
    pub interest: Interest,
    /// File descriptor number being watched.
    pub fileno: i32,
    /// Name of the logical thread that registered the listener.
    pub owner: String,
    /// Description of the callback run when the descriptor becomes ready.
    pub callback: Option<String>,
}

impl fmt::Display for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Listener {} (fd {}, {}) for green thread {:?} with run callback {}",
            self.id,
            self.fileno,
            self.interest,
            self.owner,
            self.callback.as_deref().unwrap_or("None")
        )
    }
}

/// Delivered to the running logical thread when a timeout scheduled with [`Hub::schedule_timeout`] fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{timer} expired after {after:?}")]
pub struct Expired {
    pub timer: TimerId,
    pub after: Duration,
}

/// The scheduler surface the harness depends on.
///
/// Implementations are single-threaded: methods take `&self` and mutate through interior mutability. Nothing
/// running on another OS thread may call into a hub.
pub trait Hub {
    /// Short identifier of the hub implementation (used by skip conditions).
    fn name(&self) -> &str;

    /// Current reader registrations.
    fn readers(&self) -> Vec<Listener>;

    /// Current writer registrations.
    fn writers(&self) -> Vec<Listener>;

    /// Number of timers that have neither fired nor been canceled.
    fn timers_count(&self) -> usize;

    /// Schedule a timeout that interrupts the running logical thread after `after` has elapsed.
    ///
    /// The interruption is delivered at the next suspension point as an [`Expired`] error.
    fn schedule_timeout(&self, after: Duration) -> TimerId;

    /// Cancel a timer. Returns `true` if the timer was still pending.
    ///
    /// Canceling a timer that already fired or was already canceled is a no-op returning `false`.
    fn cancel_timer(&self, timer: TimerId) -> bool;

    /// Suspend once, letting due timers and pending cancellations run.
    fn yield_once(&self) -> Result<(), Expired>;

    /// Suspend for `duration`, cooperatively.
    fn sleep(&self, duration: Duration) -> Result<(), Expired>;
}
