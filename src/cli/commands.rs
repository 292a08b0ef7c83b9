//! CLI command implementations
//!
//! All command functions return `CliResult<ExitCode>` instead of calling
//! `process::exit`. Error handling and exits happen in the top-level `run()`.

use std::io::{self, Write};
use std::os::unix::process::ExitStatusExt;
use std::path::Path;

use crate::config::HarnessConfig;
use crate::harness::{
    ConsoleReporter, IsolationRunner, JsonReporter, SuiteOptions, TestReporter, find_command, run_suite,
};

use super::{CliError, CliResult, ExitCode, ReportFormat, ScriptArgs};

/// Options for the `isolated` command.
#[derive(Debug, Clone)]
pub struct IsolatedOptions {
    pub verbose: bool,
    pub stop_on_fail: bool,
    pub filter: Option<String>,
    pub format: ReportFormat,
    pub limits: ScriptArgs,
}

/// Run one script and print its raw output. The exit code mirrors the child's.
pub fn run_script(config: HarnessConfig, script: &Path, limits: &ScriptArgs) -> CliResult<ExitCode> {
    let runner = IsolationRunner::new(config);
    let outcome = runner.run_script(script, &limits.env, limits.timeout)?;

    let mut stdout = io::stdout().lock();
    stdout
        .write_all(&outcome.output)
        .and_then(|()| stdout.flush())
        .map_err(|e| CliError::failure(format!("Error writing output: {}", e)))?;

    let code = match (outcome.status.code(), outcome.status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => 1,
    };
    Ok(ExitCode(code))
}

/// Run the isolated suite under `path`. Fails when any script failed.
pub fn run_isolated(config: HarnessConfig, path: &Path, options: IsolatedOptions) -> CliResult<ExitCode> {
    if !path.exists() {
        return Err(CliError::failure(format!("No such file or directory: '{}'", path.display())));
    }

    let runner = IsolationRunner::new(config);
    let suite = SuiteOptions {
        filter: options.filter,
        stop_on_fail: options.stop_on_fail,
        env: options.limits.env,
        timeout: options.limits.timeout,
    };

    let mut console;
    let mut json;
    let reporter: &mut dyn TestReporter = match options.format {
        ReportFormat::Console => {
            console = ConsoleReporter::new(options.verbose);
            &mut console
        }
        ReportFormat::Json => {
            json = JsonReporter::new(io::stdout());
            &mut json
        }
    };

    let summary = run_suite(&runner, path, &suite, reporter)?;
    if summary.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// Print the resolved path of `command`.
pub fn which(command: &str) -> CliResult<ExitCode> {
    let path = find_command(command)?;
    println!("{}", path.display());
    Ok(ExitCode::SUCCESS)
}
