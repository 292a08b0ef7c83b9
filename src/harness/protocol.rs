//! Isolated-script result protocol
//!
//! A script reports its result on stdout. Only the last non-empty line counts: exactly `pass` is a pass, a line
//! starting with `skip` is a skip (reason after the first `:`), anything else is a failure.

use std::fmt;
use std::io::{self, Write};

use super::errors::HarnessError;

/// Result of one isolated script, derived from its output alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolVerdict {
    Pass,
    Skip(Option<String>),
    /// Carries the whole captured output.
    Fail(String),
}

impl ProtocolVerdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, ProtocolVerdict::Pass)
    }

    pub fn into_result(self) -> Result<(), HarnessError> {
        match self {
            ProtocolVerdict::Pass => Ok(()),
            ProtocolVerdict::Skip(reason) => Err(HarnessError::SubprocessSkip { reason }),
            ProtocolVerdict::Fail(output) => Err(HarnessError::SubprocessProtocolFailure { output }),
        }
    }
}

/// The protocol line a script prints for this verdict.
impl fmt::Display for ProtocolVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVerdict::Pass => f.write_str("pass"),
            ProtocolVerdict::Skip(None) => f.write_str("skip"),
            ProtocolVerdict::Skip(Some(reason)) => write!(f, "skip:{reason}"),
            ProtocolVerdict::Fail(output) => f.write_str(output),
        }
    }
}

fn last_line(output: &str) -> Option<&str> {
    output.trim_end().lines().next_back()
}

/// Classify raw child output. Invalid UTF-8 is replaced, never rejected.
pub fn classify(output: &[u8]) -> ProtocolVerdict {
    let text = String::from_utf8_lossy(output);
    match last_line(&text) {
        Some("pass") => ProtocolVerdict::Pass,
        Some(line) if line.starts_with("skip") => {
            let reason = line
                .split_once(':')
                .map(|(_, reason)| reason.trim())
                .filter(|reason| !reason.is_empty())
                .map(str::to_string);
            ProtocolVerdict::Skip(reason)
        }
        _ => ProtocolVerdict::Fail(text.into_owned()),
    }
}

/// Print the protocol line for `verdict` from inside an isolated program.
pub fn report(verdict: &ProtocolVerdict) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{verdict}")?;
    stdout.flush()
}
