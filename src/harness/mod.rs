//! Test harness for code running on a cooperative hub
//!
//! Every test runs inside a [`LimitedTestCase`]: a cooperative deadline on the hub, an optional SIGALRM deadline,
//! and a teardown that proves the hub was left empty. Tests that patch process-global state run as separate
//! scripts through the [`IsolationRunner`] and report back over a one-line stdout protocol.

pub mod alarm;
pub mod assertions;
pub mod bounded_call;
pub mod command;
pub mod conditions;
pub mod cpu;
pub mod errors;
pub mod isolation;
pub mod leak;
pub mod lifecycle;
pub mod protocol;
pub mod sandbox;
pub mod suite;
pub mod timeout;

pub use alarm::{ALARM_EXIT_CODE, AlarmAction, AlarmGuard, SignalSnapshot};
pub use assertions::{assert_less_than, assert_less_than_equal};
pub use bounded_call::{BoundedCallResult, bounded_call};
pub use command::find_command;
pub use conditions::{SkipCondition, TestContext, on_windows, skip_if, skip_unless, skipped, using_hub};
pub use cpu::check_idle_cpu_usage;
pub use errors::{HarnessError, HarnessResult};
pub use isolation::{ChildProcessOutcome, IsolationRunner};
pub use leak::{SchedulerSnapshot, verify_hub_empty};
pub use lifecycle::{DEFAULT_TIMEOUT, LimitedTestCase, TestSettings};
pub use protocol::{ProtocolVerdict, classify};
pub use sandbox::ScriptSandbox;
pub use suite::{
    ConsoleReporter, JsonReporter, ScriptInfo, SuiteOptions, TestReporter, TestResult, TestSummary, run_suite,
};
pub use timeout::CooperativeTimeout;
