//! Subprocess isolation
//!
//! Tests that patch process-global runtime state run as separate scripts so the harness process stays clean.
//! A script runs under the configured interpreter with stdout and stderr merged into one pipe and stdin closed.
//! The wait is bounded through [`bounded_call`] rather than the hub, since the child's blocking I/O never
//! yields to any scheduler this process controls.
//!
//! Each child leads its own process group. On timeout the whole group is killed, so helpers the script spawned
//! cannot keep the output pipe open.

use std::borrow::Cow;
use std::env;
use std::ffi::OsString;
use std::fs::File;
use std::io::Read;
use std::os::fd::OwnedFd;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tracing::{debug, warn};

use super::bounded_call::{BoundedCallResult, bounded_call};
use super::command::find_command;
use super::errors::{HarnessError, HarnessResult};
use super::protocol::{ProtocolVerdict, classify};
use crate::config::HarnessConfig;

/// Everything a finished child produced.
#[derive(Debug, Clone)]
pub struct ChildProcessOutcome {
    /// Stdout and stderr interleaved as written.
    pub output: Vec<u8>,
    pub status: ExitStatus,
}

impl ChildProcessOutcome {
    pub fn output_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.output)
    }

    /// Output split on `\n`; a trailing newline leaves a trailing empty line.
    pub fn lines(&self) -> Vec<String> {
        self.output_text().split('\n').map(str::to_string).collect()
    }
}

/// Runs isolated scripts in child processes.
#[derive(Debug, Clone, Default)]
pub struct IsolationRunner {
    config: HarnessConfig,
}

impl IsolationRunner {
    pub fn new(config: HarnessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Append the script extension when missing and make the path absolute.
    pub fn resolve_script(&self, path: &Path) -> HarnessResult<PathBuf> {
        let extension = self.config.script_extension.as_str();
        let mut script = path.to_path_buf();
        if !extension.is_empty() && script.extension().is_none_or(|ext| ext != extension) {
            let mut name = script.into_os_string();
            name.push(".");
            name.push(extension);
            script = PathBuf::from(name);
        }
        Ok(std::path::absolute(script)?)
    }

    /// Interpreter path; bare names are looked up on `PATH`.
    pub fn interpreter(&self) -> HarnessResult<PathBuf> {
        let interpreter = &self.config.interpreter;
        if interpreter.components().count() > 1 {
            return Ok(interpreter.clone());
        }
        find_command(&interpreter.to_string_lossy())
    }

    /// Variables set on top of the inherited environment.
    ///
    /// The module-search variable is the parent's value followed by the harness search roots. Caller overrides are
    /// applied last and win.
    pub fn child_env(&self, overrides: &[(String, String)]) -> HarnessResult<Vec<(OsString, OsString)>> {
        let var = self.config.search_path_var.as_str();
        let mut entries: Vec<PathBuf> = env::var_os(var)
            .map(|current| env::split_paths(&current).collect())
            .unwrap_or_default();
        for root in &self.config.search_roots {
            entries.push(std::path::absolute(root)?);
        }
        let search = env::join_paths(entries)
            .map_err(|err| HarnessError::Config(format!("cannot build {var}: {err}")))?;

        let mut vars = vec![(OsString::from(var), search)];
        vars.extend(
            overrides
                .iter()
                .map(|(key, value)| (OsString::from(key), OsString::from(value))),
        );
        Ok(vars)
    }

    /// Run `interpreter <script>` and return its raw output and status.
    ///
    /// `timeout` defaults to the configured one. Past it the child's process group is killed and
    /// [`HarnessError::SubprocessTimeout`] is returned. No protocol interpretation happens here.
    pub fn run_script(
        &self,
        path: &Path,
        env: &[(String, String)],
        timeout: Option<Duration>,
    ) -> HarnessResult<ChildProcessOutcome> {
        let script = self.resolve_script(path)?;
        let interpreter = self.interpreter()?;
        let timeout = timeout.unwrap_or(self.config.default_timeout);

        let (reader, writer) = output_pipe()?;
        let mut command = Command::new(&interpreter);
        command
            .arg(&script)
            .envs(self.child_env(env)?)
            .stdin(Stdio::piped())
            .stdout(Stdio::from(writer.try_clone()?))
            .stderr(Stdio::from(writer))
            .process_group(0);

        let mut child = command.spawn().map_err(|source| HarnessError::Spawn {
            path: interpreter.clone(),
            source,
        })?;
        // Close the parent's write ends so the reader sees EOF once the child is done.
        drop(command);
        drop(child.stdin.take());

        let pid = child.id();
        debug!(pid, script = %script.display(), ?timeout, "spawned isolated script");

        match bounded_call(timeout, move || collect(child, reader))? {
            BoundedCallResult::Completed(outcome) => {
                let outcome = outcome?;
                debug!(pid, status = %outcome.status, bytes = outcome.output.len(), "isolated script finished");
                Ok(outcome)
            }
            BoundedCallResult::Panicked(message) => Err(HarnessError::Panicked(message)),
            BoundedCallResult::TimedOut => {
                kill_group(pid);
                Err(HarnessError::SubprocessTimeout { timeout, path: script })
            }
        }
    }

    /// Run `name` from the isolated directory and map its verdict onto a result.
    pub fn run_isolated(
        &self,
        name: impl AsRef<Path>,
        env: &[(String, String)],
        timeout: Option<Duration>,
    ) -> HarnessResult<()> {
        self.run_isolated_verdict(name, env, timeout)?.into_result()
    }

    /// Verdict of `name` without mapping it to an error. An absolute `name` is used as is.
    pub fn run_isolated_verdict(
        &self,
        name: impl AsRef<Path>,
        env: &[(String, String)],
        timeout: Option<Duration>,
    ) -> HarnessResult<ProtocolVerdict> {
        let path = self.config.isolated_dir.join(name);
        let outcome = self.run_script(&path, env, timeout)?;
        Ok(classify(&outcome.output))
    }
}

/// Pipe whose ends are not inherited by unrelated children.
///
/// Both ends are created close-on-exec in one call, so a child spawned concurrently by another thread never holds
/// the write end open.
#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "illumos",
    target_os = "solaris"
))]
fn output_pipe() -> HarnessResult<(File, OwnedFd)> {
    use nix::fcntl::OFlag;
    use nix::unistd::pipe2;

    let (reader, writer) = pipe2(OFlag::O_CLOEXEC)?;
    Ok((File::from(reader), writer))
}

/// Pipe whose ends are not inherited by unrelated children.
///
/// No `pipe2` here: the flags are set right after creation, leaving a short window for concurrent spawns.
#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "illumos",
    target_os = "solaris"
)))]
fn output_pipe() -> HarnessResult<(File, OwnedFd)> {
    use nix::fcntl::{FcntlArg, FdFlag, fcntl};
    use nix::unistd::pipe;
    use std::os::fd::AsRawFd;

    let (reader, writer) = pipe()?;
    fcntl(reader.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    fcntl(writer.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    Ok((File::from(reader), writer))
}

fn collect(mut child: Child, mut reader: File) -> std::io::Result<ChildProcessOutcome> {
    let mut output = Vec::new();
    reader.read_to_end(&mut output)?;
    let status = child.wait()?;
    Ok(ChildProcessOutcome { output, status })
}

fn kill_group(pid: u32) {
    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        // Already gone.
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(errno) => warn!(pid, %errno, "failed to kill timed-out script"),
    }
}
