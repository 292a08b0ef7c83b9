//! SIGALRM last-resort deadline.
//!
//! A test that spins without ever reaching a hub suspension point cannot be stopped by its cooperative
//! timeout. `AlarmGuard` arms `alarm(2)` with a harness handler for the duration of one test and puts the
//! previous handler and pending alarm back afterwards, whatever happened in between.
//!
//! Unwinding out of a signal handler is not possible in Rust, so the handler cannot raise at the interrupted
//! instruction. It either terminates the process with a diagnostic ([`AlarmAction::Abort`], the only way to
//! stop a pure busy loop) or records the expiry for code that polls [`AlarmGuard::check`]
//! ([`AlarmAction::Record`]).

#![allow(unsafe_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use nix::libc;
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use nix::unistd::alarm;
use tracing::{debug, warn};

use super::errors::{HarnessError, HarnessResult};

/// Exit status used when an aborting alarm fires (matches `timeout(1)`).
pub const ALARM_EXIT_CODE: i32 = 124;

const ALARM_MESSAGE: &[u8] = b"hubcheck: test is taking too long (alarm expired)\n";

static FIRED: AtomicBool = AtomicBool::new(false);
static ABORT: AtomicBool = AtomicBool::new(true);
static SECONDS: AtomicU32 = AtomicU32::new(0);

extern "C" fn on_alarm(_signal: libc::c_int) {
    FIRED.store(true, Ordering::SeqCst);
    if ABORT.load(Ordering::SeqCst) {
        // SAFETY: write(2) and _exit(2) are async-signal-safe; the message is a static buffer.
        unsafe {
            libc::write(libc::STDERR_FILENO, ALARM_MESSAGE.as_ptr().cast(), ALARM_MESSAGE.len());
            libc::_exit(ALARM_EXIT_CODE);
        }
    }
}

/// What the harness handler does when the alarm fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlarmAction {
    /// Print a diagnostic and terminate the process with [`ALARM_EXIT_CODE`].
    #[default]
    Abort,
    /// Only record the expiry; [`AlarmGuard::check`] reports it.
    Record,
}

/// SIGALRM disposition and pending alarm at one point in time.
#[derive(Debug, Clone, Copy)]
pub struct SignalSnapshot {
    action: SigAction,
    pending: Option<u32>,
}

impl SignalSnapshot {
    /// Read the current SIGALRM handler and pending alarm without changing them.
    pub fn capture() -> HarnessResult<Self> {
        let probe = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
        // SAFETY: the handler read back is reinstalled immediately; SIG_IGN is harmless in between.
        let action = unsafe { sigaction(Signal::SIGALRM, &probe) }?;
        // SAFETY: reinstalls the handler that was active a moment ago.
        unsafe { sigaction(Signal::SIGALRM, &action) }?;

        let pending = alarm::cancel();
        if let Some(remaining) = pending.filter(|r| *r > 0) {
            let _ = alarm::set(remaining);
        }
        Ok(Self { action, pending })
    }

    pub fn handler(&self) -> SigHandler {
        self.action.handler()
    }

    /// Seconds left on the alarm that was pending, if any.
    pub fn pending_alarm(&self) -> Option<u32> {
        self.pending
    }

    fn restore(&self) -> HarnessResult<()> {
        let _ = alarm::cancel();
        // SAFETY: reinstalls a disposition previously returned by sigaction.
        unsafe { sigaction(Signal::SIGALRM, &self.action) }?;
        if let Some(remaining) = self.pending.filter(|r| *r > 0) {
            let _ = alarm::set(remaining);
        }
        Ok(())
    }
}

/// Opt-in SIGALRM deadline for one test. Restores the previous signal state on `disarm` or drop.
pub struct AlarmGuard {
    seconds: u32,
    previous: Option<SignalSnapshot>,
    previous_abort: bool,
}

impl AlarmGuard {
    pub fn arm(seconds: u32, action: AlarmAction) -> HarnessResult<Self> {
        if seconds == 0 {
            return Err(HarnessError::Config("alarm must be at least one second".to_string()));
        }

        let previous_abort = ABORT.swap(action == AlarmAction::Abort, Ordering::SeqCst);
        FIRED.store(false, Ordering::SeqCst);
        SECONDS.store(seconds, Ordering::SeqCst);

        let handler = SigAction::new(SigHandler::Handler(on_alarm), SaFlags::SA_RESTART, SigSet::empty());
        // SAFETY: `on_alarm` only touches atomics and async-signal-safe libc calls.
        let action_before = match unsafe { sigaction(Signal::SIGALRM, &handler) } {
            Ok(before) => before,
            Err(errno) => {
                ABORT.store(previous_abort, Ordering::SeqCst);
                return Err(errno.into());
            }
        };
        let pending = alarm::set(seconds);
        debug!(seconds, ?action, previous_alarm = ?pending, "alarm armed");

        Ok(Self {
            seconds,
            previous: Some(SignalSnapshot {
                action: action_before,
                pending,
            }),
            previous_abort,
        })
    }

    pub fn seconds(&self) -> u32 {
        self.seconds
    }

    /// Whether the alarm has fired (only observable with [`AlarmAction::Record`]).
    pub fn fired(&self) -> bool {
        FIRED.load(Ordering::SeqCst)
    }

    /// Fail with [`HarnessError::AlarmTimeoutExceeded`] once the alarm has fired.
    pub fn check(&self) -> HarnessResult<()> {
        if self.fired() {
            Err(HarnessError::AlarmTimeoutExceeded {
                seconds: SECONDS.load(Ordering::SeqCst),
            })
        } else {
            Ok(())
        }
    }

    /// Restore the handler and pending alarm saved by [`AlarmGuard::arm`].
    pub fn disarm(mut self) -> HarnessResult<()> {
        self.restore()
    }

    fn restore(&mut self) -> HarnessResult<()> {
        let Some(previous) = self.previous.take() else {
            return Ok(());
        };
        let restored = previous.restore();
        ABORT.store(self.previous_abort, Ordering::SeqCst);
        debug!(seconds = self.seconds, ok = restored.is_ok(), "alarm restored");
        restored
    }
}

impl Drop for AlarmGuard {
    fn drop(&mut self) {
        if let Err(err) = self.restore() {
            warn!(%err, "failed to restore SIGALRM state");
        }
    }
}
