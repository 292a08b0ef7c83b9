//! Per-test setup and teardown
//!
//! [`LimitedTestCase`] wraps one test body. Setup arms the cooperative timeout and, when asked, the alarm.
//! Teardown always runs every step in a fixed order, so a failing body can neither skip the leak check nor hide
//! a teardown failure:
//!
//! 1. cancel the cooperative timeout
//! 2. restore the SIGALRM state
//! 3. drain the worker pool
//! 4. drop whatever the body captured
//! 5. yield once so pending cancellations settle
//! 6. verify the hub is empty

use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use hubcheck_core::{Hub, WorkerPool, panic_message};
use tracing::{debug, warn};

use super::alarm::{AlarmAction, AlarmGuard};
use super::conditions::{SkipCondition, TestContext, skip_if, skip_unless};
use super::errors::{HarnessError, HarnessResult};
use super::leak::verify_hub_empty;
use super::timeout::CooperativeTimeout;

/// Cooperative deadline applied when a test does not choose its own.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-test knobs.
#[derive(Debug)]
pub struct TestSettings {
    pub timeout: Duration,
    pub alarm: Option<(u32, AlarmAction)>,
    skip_if: Vec<SkipCondition>,
    skip_unless: Vec<SkipCondition>,
}

impl Default for TestSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            alarm: None,
            skip_if: Vec::new(),
            skip_unless: Vec::new(),
        }
    }
}

impl TestSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_alarm(mut self, seconds: u32, action: AlarmAction) -> Self {
        self.alarm = Some((seconds, action));
        self
    }

    pub fn skip_if(mut self, condition: impl Into<SkipCondition>) -> Self {
        self.skip_if.push(condition.into());
        self
    }

    pub fn skip_unless(mut self, condition: impl Into<SkipCondition>) -> Self {
        self.skip_unless.push(condition.into());
        self
    }

    fn check_skips(&self, ctx: &TestContext<'_>) -> HarnessResult<()> {
        for condition in &self.skip_if {
            skip_if(condition, ctx)?;
        }
        for condition in &self.skip_unless {
            skip_unless(condition, ctx)?;
        }
        Ok(())
    }
}

/// One test's armed deadlines plus the hub and pool it must leave clean.
pub struct LimitedTestCase<'h, H: Hub + ?Sized> {
    name: String,
    hub: &'h H,
    timeout: CooperativeTimeout<'h, H>,
    alarm: Option<AlarmGuard>,
    alarm_action: AlarmAction,
    pool: Option<&'h dyn WorkerPool>,
    settings: TestSettings,
}

impl<'h, H: Hub + ?Sized> LimitedTestCase<'h, H> {
    pub fn set_up(name: impl Into<String>, hub: &'h H, settings: TestSettings) -> HarnessResult<Self> {
        let name = name.into();
        let timeout = CooperativeTimeout::arm(hub, settings.timeout);
        let (alarm, alarm_action) = match settings.alarm {
            Some((seconds, action)) => (Some(AlarmGuard::arm(seconds, action)?), action),
            None => (None, AlarmAction::default()),
        };
        debug!(test = %name, hub = hub.name(), timeout = ?settings.timeout, "test set up");
        Ok(Self {
            name,
            hub,
            timeout,
            alarm,
            alarm_action,
            pool: None,
            settings,
        })
    }

    /// Drain `pool` during teardown.
    pub fn with_pool(mut self, pool: &'h dyn WorkerPool) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hub(&self) -> &'h H {
        self.hub
    }

    pub fn context(&self) -> TestContext<'_> {
        TestContext {
            test_name: &self.name,
            hub_name: self.hub.name(),
        }
    }

    /// Replace the cooperative deadline; the previous one can no longer fire.
    pub fn reset_timeout(&mut self, timeout: Duration) {
        self.timeout.reset(timeout);
    }

    /// Arm (or re-arm) the alarm for the rest of this test.
    ///
    /// An existing guard is restored first, so the state saved by the new guard is the one from before the
    /// test started.
    pub fn set_alarm(&mut self, seconds: u32) -> HarnessResult<()> {
        if let Some(guard) = self.alarm.take() {
            guard.disarm()?;
        }
        self.alarm = Some(AlarmGuard::arm(seconds, self.alarm_action)?);
        Ok(())
    }

    /// Fail if a recording alarm has fired.
    pub fn check_alarm(&self) -> HarnessResult<()> {
        match &self.alarm {
            Some(guard) => guard.check(),
            None => Ok(()),
        }
    }

    /// Run teardown and return every failure it hit, in order.
    fn tear_down_steps(mut self) -> Vec<HarnessError> {
        let mut failures = Vec::new();

        self.timeout.cancel();

        if let Some(guard) = self.alarm.take() {
            if let Err(err) = guard.disarm() {
                warn!(test = %self.name, %err, "alarm restore failed");
                failures.push(err);
            }
        }

        if let Some(pool) = self.pool {
            pool.kill_all();
        }

        if let Err(expired) = self.hub.yield_once() {
            failures.push(expired.into());
        }

        if let Err(err) = verify_hub_empty(self.hub) {
            warn!(test = %self.name, %err, "hub not empty after test");
            failures.push(err);
        }

        debug!(test = %self.name, failures = failures.len(), "test torn down");
        failures
    }

    pub fn tear_down(self) -> HarnessResult<()> {
        match HarnessError::merge(None, self.tear_down_steps()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Evaluate skip conditions, run `body`, then always tear down.
    ///
    /// A panic in `body` becomes [`HarnessError::Panicked`]. A body failure and teardown failures are reported
    /// together.
    pub fn run<T, F>(mut self, body: F) -> HarnessResult<T>
    where
        F: FnOnce(&mut Self) -> HarnessResult<T>,
    {
        let outcome = match self.settings.check_skips(&self.context()) {
            Ok(()) => match panic::catch_unwind(AssertUnwindSafe(|| body(&mut self))) {
                Ok(result) => result,
                Err(payload) => Err(HarnessError::Panicked(panic_message(payload.as_ref()))),
            },
            Err(skip) => Err(skip),
        };

        let failures = self.tear_down_steps();
        match outcome {
            Ok(value) => match HarnessError::merge(None, failures) {
                Some(err) => Err(err),
                None => Ok(value),
            },
            Err(err) => Err(err.with_teardown(failures)),
        }
    }
}
