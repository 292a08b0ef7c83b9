//! Harness error kinds
//!
//! Every failure the harness can raise is a variant of [`HarnessError`]. None of them is swallowed on the way to
//! the test runner; skip signals are errors too so they propagate with `?`, and callers tell them apart with
//! [`HarnessError::is_skip`].

use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Duration;

use hubcheck_core::Expired;
use miette::Diagnostic;
use thiserror::Error;

use super::leak::SchedulerSnapshot;

/// Result type for harness operations.
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Errors raised by the harness and by tests running under it.
#[derive(Debug, Error, Diagnostic)]
pub enum HarnessError {
    #[error("test is taking too long: no cooperative progress within {}s", secs(.after))]
    #[diagnostic(
        code(hubcheck::cooperative_timeout),
        help("raise the per-test timeout with `reset_timeout` if the test is legitimately slow")
    )]
    CooperativeTimeoutExceeded { after: Duration },

    #[error("test is taking too long: alarm of {seconds}s expired")]
    #[diagnostic(
        code(hubcheck::alarm_timeout),
        help("the test never reached a suspension point; look for a busy loop")
    )]
    AlarmTimeoutExceeded { seconds: u32 },

    #[error("scheduler leak detected: {0}")]
    #[diagnostic(
        code(hubcheck::hub_leak),
        help("every reader, writer and timer must be removed or canceled before the test returns")
    )]
    SchedulerLeakDetected(SchedulerSnapshot),

    #[error("run_script timeout={} path=\"{}\"", secs(.timeout), .path.display())]
    #[diagnostic(code(hubcheck::subprocess_timeout))]
    SubprocessTimeout { timeout: Duration, path: PathBuf },

    #[error("skipped by isolated script{}", reason_suffix(.reason))]
    #[diagnostic(code(hubcheck::subprocess_skip))]
    SubprocessSkip { reason: Option<String> },

    #[error("isolated script did not report pass; output:\n{output}")]
    #[diagnostic(code(hubcheck::protocol_failure))]
    SubprocessProtocolFailure { output: String },

    #[error("command not found: {command:?}")]
    #[diagnostic(code(hubcheck::command_not_found), help("check PATH or configure an absolute path"))]
    CommandNotFound { command: String },

    #[error("skipped{}", reason_suffix(.reason))]
    #[diagnostic(code(hubcheck::skipped))]
    Skipped { reason: Option<String> },

    #[error("assertion failed: {0}")]
    #[diagnostic(code(hubcheck::assertion))]
    Assertion(String),

    #[error("test panicked: {0}")]
    #[diagnostic(code(hubcheck::panicked))]
    Panicked(String),

    #[error("failed to spawn {}: {source}", .path.display())]
    #[diagnostic(code(hubcheck::spawn))]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("signal state error: {0}")]
    #[diagnostic(code(hubcheck::signal))]
    Signal(#[from] nix::errno::Errno),

    #[error("invalid configuration: {0}")]
    #[diagnostic(code(hubcheck::config))]
    Config(String),

    #[error("I/O error: {0}")]
    #[diagnostic(code(hubcheck::io))]
    Io(#[from] std::io::Error),

    #[error("{}", render_teardown(.primary, .failures))]
    #[diagnostic(code(hubcheck::teardown))]
    TeardownFailed {
        primary: Option<Box<HarnessError>>,
        failures: Vec<HarnessError>,
    },
}

impl HarnessError {
    /// Whether this is a skip signal rather than a failure.
    pub fn is_skip(&self) -> bool {
        matches!(self, HarnessError::Skipped { .. } | HarnessError::SubprocessSkip { .. })
    }

    /// Skip reason, if this is a skip signal that carries one.
    pub fn skip_reason(&self) -> Option<&str> {
        match self {
            HarnessError::Skipped { reason } | HarnessError::SubprocessSkip { reason } => reason.as_deref(),
            _ => None,
        }
    }

    /// Combine a test-body outcome with teardown failures so neither masks the other.
    pub(crate) fn merge(primary: Option<HarnessError>, mut failures: Vec<HarnessError>) -> Option<HarnessError> {
        match (primary, failures.len()) {
            (primary, 0) => primary,
            (None, 1) => failures.pop(),
            (primary, _) => Some(HarnessError::TeardownFailed {
                primary: primary.map(Box::new),
                failures,
            }),
        }
    }
}

impl HarnessError {
    /// Attach teardown failures to a body failure; unchanged when teardown was clean.
    pub(crate) fn with_teardown(self, failures: Vec<HarnessError>) -> HarnessError {
        if failures.is_empty() {
            self
        } else {
            HarnessError::TeardownFailed {
                primary: Some(Box::new(self)),
                failures,
            }
        }
    }
}

impl From<Expired> for HarnessError {
    fn from(expired: Expired) -> Self {
        HarnessError::CooperativeTimeoutExceeded { after: expired.after }
    }
}

/// Seconds as the shortest decimal (`10`, `0.25`).
pub(crate) fn secs(duration: &Duration) -> String {
    format!("{}", duration.as_secs_f64())
}

fn reason_suffix(reason: &Option<String>) -> String {
    match reason {
        Some(reason) => format!(": {reason}"),
        None => String::new(),
    }
}

fn render_teardown(primary: &Option<Box<HarnessError>>, failures: &[HarnessError]) -> String {
    let mut out = String::new();
    if let Some(primary) = primary {
        let _ = writeln!(out, "test failed: {primary}");
    }
    let _ = write!(out, "teardown failed ({} error(s))", failures.len());
    for failure in failures {
        let _ = write!(out, "\n  - {failure}");
    }
    out
}
