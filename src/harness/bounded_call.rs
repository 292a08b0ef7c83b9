//! Bounded wait on a blocking call.
//!
//! `bounded_call` runs a closure on a fresh OS thread and waits for it for at most a deadline. It exists for
//! calls that may never return control to the hub (a wedged scheduler, a child process that never exits):
//! waiting through the hub's own sleep would hang with them, a real thread cannot.
//!
//! On timeout the worker thread is abandoned, not killed. It keeps running in the background and whatever it
//! eventually produces is dropped. Callers must not assume the closure's side effects are either complete or
//! absent, only that control came back. The abandoned thread is a leak bounded by the process lifetime.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use hubcheck_core::panic_message;
use tracing::{debug, warn};

/// Outcome of [`bounded_call`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundedCallResult<T> {
    /// The closure returned before the deadline.
    Completed(T),
    /// The deadline passed first; the worker thread was abandoned.
    TimedOut,
    /// The closure panicked before the deadline.
    Panicked(String),
}

impl<T> BoundedCallResult<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, BoundedCallResult::Completed(_))
    }

    pub fn into_completed(self) -> Option<T> {
        match self {
            BoundedCallResult::Completed(value) => Some(value),
            _ => None,
        }
    }
}

/// Run `f` on a dedicated thread and wait at most `timeout` for it.
///
/// Only failing to spawn the thread is an error; everything the closure does is reported through
/// [`BoundedCallResult`].
pub fn bounded_call<F, T>(timeout: Duration, f: F) -> io::Result<BoundedCallResult<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(1);

    thread::Builder::new().name("bounded-call".to_string()).spawn(move || {
        let outcome = panic::catch_unwind(AssertUnwindSafe(f));
        // The receiver is gone when the caller already gave up.
        let _ = tx.send(outcome);
    })?;

    let result = match rx.recv_timeout(timeout) {
        Ok(Ok(value)) => BoundedCallResult::Completed(value),
        Ok(Err(payload)) => BoundedCallResult::Panicked(panic_message(payload.as_ref())),
        Err(RecvTimeoutError::Timeout) => {
            warn!(?timeout, "bounded call timed out; abandoning worker thread");
            BoundedCallResult::TimedOut
        }
        Err(RecvTimeoutError::Disconnected) => {
            BoundedCallResult::Panicked("worker exited without a result".to_string())
        }
    };
    debug!(completed = result.is_completed(), "bounded call finished");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Instant;

    #[test]
    fn test_completed_call_returns_value() {
        let result = bounded_call(Duration::from_secs(5), || "done").unwrap();
        assert_eq!(result, BoundedCallResult::Completed("done"));
        assert!(result.is_completed());
    }

    #[test]
    fn test_slow_call_times_out_promptly() {
        let start = Instant::now();
        let result = bounded_call(Duration::from_millis(100), || {
            thread::sleep(Duration::from_secs(5));
            1
        })
        .unwrap();
        assert_eq!(result, BoundedCallResult::TimedOut);
        assert!(start.elapsed() < Duration::from_secs(2), "took {:?}", start.elapsed());
        assert_eq!(result.into_completed(), None);
    }

    #[test]
    fn test_panic_after_timeout_is_never_surfaced() {
        let result = bounded_call(Duration::from_millis(20), || -> u8 {
            thread::sleep(Duration::from_millis(200));
            panic!("late failure");
        })
        .unwrap();
        assert_eq!(result, BoundedCallResult::TimedOut);
        // Give the abandoned worker time to panic; nothing reaches this thread.
        thread::sleep(Duration::from_millis(300));
    }

    #[test]
    fn test_panic_before_deadline_is_reported() {
        let result = bounded_call(Duration::from_secs(5), || -> u8 { panic!("early failure") }).unwrap();
        assert_eq!(result, BoundedCallResult::Panicked("early failure".to_string()));
    }

    #[test]
    fn test_abandoned_worker_keeps_running() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let result = bounded_call(Duration::from_millis(10), move || {
            thread::sleep(Duration::from_millis(100));
            flag.store(true, Ordering::SeqCst);
        })
        .unwrap();
        assert!(!result.is_completed());

        let deadline = Instant::now() + Duration::from_secs(5);
        while !finished.load(Ordering::SeqCst) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(finished.load(Ordering::SeqCst));
    }
}
