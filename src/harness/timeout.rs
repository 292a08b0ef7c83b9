//! Per-test cooperative deadline.
//!
//! The deadline is a hub timer. When it fires, the hub interrupts the test's logical thread at its next
//! suspension point with an [`Expired`](hubcheck_core::Expired), which the test propagates as
//! [`HarnessError::CooperativeTimeoutExceeded`](super::HarnessError::CooperativeTimeoutExceeded). Code that never
//! suspends cannot be interrupted this way; see [`AlarmGuard`](super::alarm::AlarmGuard).

use std::time::Duration;

use hubcheck_core::{Hub, TimerId};
use tracing::debug;

/// Timeout armed on a hub for the duration of one test.
pub struct CooperativeTimeout<'h, H: Hub + ?Sized> {
    hub: &'h H,
    timer: Option<TimerId>,
    duration: Duration,
}

impl<'h, H: Hub + ?Sized> CooperativeTimeout<'h, H> {
    pub fn arm(hub: &'h H, duration: Duration) -> Self {
        let timer = hub.schedule_timeout(duration);
        debug!(%timer, ?duration, "cooperative timeout armed");
        Self {
            hub,
            timer: Some(timer),
            duration,
        }
    }

    /// Duration of the most recently armed deadline.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn is_armed(&self) -> bool {
        self.timer.is_some()
    }

    /// Cancel the current deadline and arm a new one; only the new one can fire.
    pub fn reset(&mut self, duration: Duration) {
        self.cancel();
        self.timer = Some(self.hub.schedule_timeout(duration));
        self.duration = duration;
        debug!(?duration, "cooperative timeout reset");
    }

    /// Cancel the deadline. Returns `true` if a pending timer was removed.
    ///
    /// Calling this again, or after the timer fired, does nothing.
    pub fn cancel(&mut self) -> bool {
        match self.timer.take() {
            Some(timer) => self.hub.cancel_timer(timer),
            None => false,
        }
    }
}

impl<H: Hub + ?Sized> Drop for CooperativeTimeout<'_, H> {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::HarnessError;
    use hubcheck_core::LabHub;

    #[test]
    fn test_arm_registers_one_timer() {
        let hub = LabHub::with_virtual_clock();
        let timeout = CooperativeTimeout::arm(&hub, Duration::from_secs(10));
        assert!(timeout.is_armed());
        assert_eq!(timeout.duration(), Duration::from_secs(10));
        assert_eq!(hub.timers_count(), 1);
    }

    #[test]
    fn test_cancel_twice_is_noop() {
        let hub = LabHub::with_virtual_clock();
        let mut timeout = CooperativeTimeout::arm(&hub, Duration::from_secs(1));
        assert!(timeout.cancel());
        assert!(!timeout.cancel());
        assert!(!timeout.is_armed());
        assert_eq!(hub.timers_count(), 0);
    }

    #[test]
    fn test_cancel_after_fire_is_noop() {
        let hub = LabHub::with_virtual_clock();
        let mut timeout = CooperativeTimeout::arm(&hub, Duration::from_millis(5));
        assert!(hub.sleep(Duration::from_millis(10)).is_err());
        assert!(!timeout.cancel());
    }

    #[test]
    fn test_reset_replaces_deadline() {
        let hub = LabHub::with_virtual_clock();
        let mut timeout = CooperativeTimeout::arm(&hub, Duration::from_millis(50));
        timeout.reset(Duration::from_millis(200));
        assert_eq!(hub.timers_count(), 1);

        // The original 50ms deadline no longer fires.
        hub.sleep(Duration::from_millis(150)).unwrap();

        let err: HarnessError = hub.sleep(Duration::from_millis(100)).unwrap_err().into();
        assert!(matches!(
            err,
            HarnessError::CooperativeTimeoutExceeded { after } if after == Duration::from_millis(200)
        ));
    }

    #[test]
    fn test_drop_cancels() {
        let hub = LabHub::with_virtual_clock();
        {
            let _timeout = CooperativeTimeout::arm(&hub, Duration::from_secs(1));
            assert_eq!(hub.timers_count(), 1);
        }
        assert_eq!(hub.timers_count(), 0);
    }
}
