#![deny(unsafe_code)]
//! hubcheck: a test harness for code running on a cooperative hub
//!
//! Tests get a cooperative deadline, an opt-in SIGALRM deadline and a zero-tolerance leak check on the hub after
//! every run. Tests that patch process-global state run as child scripts that report `pass`, `skip[:reason]` or
//! anything else (a failure) as their last line of output.
//!
//! ## Panic Policy
//!
//! This codebase follows explicit error handling:
//!
//! - **Production code**: Use `Result` or `Option` with `?` / `ok_or` / `map_err`. The `cli` module enforces
//!   `#![deny(clippy::unwrap_used)]`.
//!
//! - **Test code**: `.unwrap()` and `.expect()` are acceptable in tests.
//!
//! - **Test bodies**: a panic inside a body run by [`harness::LimitedTestCase::run`] is caught and reported as
//!   [`harness::HarnessError::Panicked`]; teardown still runs.
//!
//! ## Unsafe
//!
//! Only `harness::alarm` opts out of `deny(unsafe_code)`, for `sigaction` and the signal handler itself.

#[cfg(not(unix))]
compile_error!("hubcheck relies on POSIX signals and process groups and only supports unix targets");

pub mod cli;
pub mod config;
pub mod harness;
pub mod version;

pub use config::HarnessConfig;
pub use harness::{HarnessError, HarnessResult, IsolationRunner, LimitedTestCase, ProtocolVerdict, TestSettings};
pub use hubcheck_core::{Hub, LabHub};
