//! CLI module for hubcheck
//!
//! ## Commands
//!
//! - `run <script>` - Run one script under the interpreter and print its raw output
//! - `isolated [path]` - Run every isolated script under a directory and report pass/skip/fail
//! - `which <command>` - Resolve a command on `PATH`
//!
//! ## Design
//!
//! The CLI uses clap for argument parsing with derive macros.
//! Command functions return `CliResult<T>` instead of calling `process::exit`.
//! Only the top-level `run()` function handles errors and exits.

// Enforce explicit error handling - no panicking in production code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod commands;

use std::fmt;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::{HarnessConfig, parse_timeout};
use crate::harness::{ALARM_EXIT_CODE, HarnessError};
use crate::version::HUBCHECK_VERSION;

// ============================================================================
// CLI Error handling
// ============================================================================

/// Exit code for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(pub i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    pub const FAILURE: ExitCode = ExitCode(1);
    /// Same status `timeout(1)` uses.
    pub const TIMEOUT: ExitCode = ExitCode(ALARM_EXIT_CODE);
}

/// Error type for CLI operations.
///
/// Contains a user-facing message and an exit code. The CLI entry point
/// catches these errors, prints the message, and exits with the code.
#[derive(Debug)]
pub struct CliError {
    /// User-facing error message (already formatted for display)
    pub message: String,
    /// Exit code to return to the shell
    pub exit_code: ExitCode,
}

impl CliError {
    /// Create a new CLI error with a message and exit code.
    pub fn new(message: impl Into<String>, exit_code: ExitCode) -> Self {
        Self {
            message: message.into(),
            exit_code,
        }
    }

    /// Create a failure error (exit code 1).
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(message, ExitCode::FAILURE)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

/// Harness errors are rendered as miette diagnostics.
impl From<HarnessError> for CliError {
    fn from(err: HarnessError) -> Self {
        let exit_code = match err {
            HarnessError::SubprocessTimeout { .. } => ExitCode::TIMEOUT,
            _ => ExitCode::FAILURE,
        };
        Self::new(format!("{:?}", miette::Report::new(err)), exit_code)
    }
}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

// ============================================================================
// Clap CLI definition
// ============================================================================

/// Test harness for cooperative-runtime code
#[derive(Parser, Debug)]
#[command(name = "hubcheck")]
#[command(version = HUBCHECK_VERSION)]
#[command(about = "Run isolated test scripts with deadlines and a pass/skip/fail protocol", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Interpreter that runs scripts (overrides HUBCHECK_INTERPRETER)
    #[arg(long, global = true, value_name = "PATH")]
    pub interpreter: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one script and print its raw output
    Run {
        /// Script to run (extension appended when missing)
        #[arg(value_name = "SCRIPT")]
        script: PathBuf,
        #[command(flatten)]
        limits: ScriptArgs,
    },

    /// Run isolated scripts and report pass/skip/fail
    Isolated {
        /// Script file or directory (default: the configured isolated directory)
        #[arg(value_name = "PATH")]
        path: Option<PathBuf>,
        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
        /// Stop on first failure
        #[arg(short = 'x', long = "exitfirst")]
        stop_on_fail: bool,
        /// Only run scripts whose name contains this keyword
        #[arg(short = 'k', value_name = "EXPR")]
        filter: Option<String>,
        /// Report format
        #[arg(long, value_enum, default_value_t = ReportFormat::Console)]
        format: ReportFormat,
        #[command(flatten)]
        limits: ScriptArgs,
    },

    /// Resolve a command on PATH
    Which {
        #[arg(value_name = "COMMAND")]
        command: String,
    },
}

/// Options shared by every command that launches scripts.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ScriptArgs {
    /// Per-script timeout in seconds (default: HUBCHECK_TIMEOUT or 10)
    #[arg(long, value_name = "SECS", value_parser = parse_timeout_arg)]
    pub timeout: Option<Duration>,
    /// Extra environment variable for the child
    #[arg(short = 'e', long = "env", value_name = "KEY=VALUE", value_parser = parse_env_arg)]
    pub env: Vec<(String, String)>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Console,
    Json,
}

fn parse_timeout_arg(raw: &str) -> Result<Duration, String> {
    parse_timeout(raw).map_err(|e| e.to_string())
}

fn parse_env_arg(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {raw:?}")),
    }
}

// ============================================================================
// CLI entry point
// ============================================================================

/// Main CLI entry point.
///
/// This is the only place where `process::exit` is called. All command
/// implementations return `CliResult` and errors are handled here.
pub fn run() {
    let cli = Cli::parse();

    match execute(cli) {
        Ok(exit_code) => {
            if exit_code.0 != 0 {
                process::exit(exit_code.0);
            }
        }
        Err(e) => {
            if !e.message.is_empty() {
                eprintln!("{}", e.message);
            }
            process::exit(e.exit_code.0);
        }
    }
}

/// Execute the CLI command and return result.
fn execute(cli: Cli) -> CliResult<ExitCode> {
    let mut config = HarnessConfig::from_env()?;
    if let Some(interpreter) = cli.interpreter {
        config = config.with_interpreter(interpreter);
    }

    match cli.command {
        Command::Run { script, limits } => commands::run_script(config, &script, &limits),
        Command::Isolated {
            path,
            verbose,
            stop_on_fail,
            filter,
            format,
            limits,
        } => {
            let path = path.unwrap_or_else(|| config.isolated_dir.clone());
            commands::run_isolated(
                config,
                &path,
                commands::IsolatedOptions {
                    verbose,
                    stop_on_fail,
                    filter,
                    format,
                    limits,
                },
            )
        }
        Command::Which { command } => commands::which(&command),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_run() {
        let cli = Cli::try_parse_from(["hubcheck", "run", "check.sh", "--timeout", "1.5", "-e", "MODE=fast"]).unwrap();
        if let Command::Run { script, limits } = cli.command {
            assert_eq!(script, PathBuf::from("check.sh"));
            assert_eq!(limits.timeout, Some(Duration::from_millis(1500)));
            assert_eq!(limits.env, vec![("MODE".to_string(), "fast".to_string())]);
        } else {
            panic!("Expected Run command");
        }
    }

    #[test]
    fn test_cli_parse_isolated() {
        let cli =
            Cli::try_parse_from(["hubcheck", "isolated", "-v", "-x", "-k", "patcher", "--format", "json"]).unwrap();
        if let Command::Isolated {
            path,
            verbose,
            stop_on_fail,
            filter,
            format,
            ..
        } = cli.command
        {
            assert!(path.is_none());
            assert!(verbose);
            assert!(stop_on_fail);
            assert_eq!(filter.as_deref(), Some("patcher"));
            assert_eq!(format, ReportFormat::Json);
        } else {
            panic!("Expected Isolated command");
        }
    }

    #[test]
    fn test_cli_parse_global_interpreter() {
        let cli = Cli::try_parse_from(["hubcheck", "which", "sh", "--interpreter", "/usr/bin/python3"]).unwrap();
        assert_eq!(cli.interpreter, Some(PathBuf::from("/usr/bin/python3")));
        assert!(matches!(cli.command, Command::Which { ref command } if command == "sh"));
    }

    #[test]
    fn test_cli_rejects_bad_arguments() {
        assert!(Cli::try_parse_from(["hubcheck", "run", "x", "--timeout", "0"]).is_err());
        assert!(Cli::try_parse_from(["hubcheck", "run", "x", "-e", "NOEQUALS"]).is_err());
        assert!(Cli::try_parse_from(["hubcheck", "isolated", "--format", "xml"]).is_err());
    }

    #[test]
    fn test_timeout_error_maps_to_timeout_exit_code() {
        let err: CliError = HarnessError::SubprocessTimeout {
            timeout: Duration::from_secs(1),
            path: PathBuf::from("/tmp/slow.sh"),
        }
        .into();
        assert_eq!(err.exit_code, ExitCode::TIMEOUT);
        assert!(err.message.contains("run_script timeout=1"), "{}", err.message);

        let err: CliError = HarnessError::CommandNotFound {
            command: "python9".to_string(),
        }
        .into();
        assert_eq!(err.exit_code, ExitCode::FAILURE);
    }
}
