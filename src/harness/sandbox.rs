//! Throwaway directory for scripts a test writes and launches itself.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;

use super::errors::HarnessResult;
use super::isolation::IsolationRunner;

/// Temporary script directory, removed on drop.
pub struct ScriptSandbox {
    dir: TempDir,
    runner: IsolationRunner,
}

impl ScriptSandbox {
    pub fn new(runner: IsolationRunner) -> HarnessResult<Self> {
        let dir = tempfile::Builder::new().prefix("hubcheck-").tempdir()?;
        Ok(Self { dir, runner })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `contents` to `name` (extension appended when missing) and return the full path.
    pub fn write_script(&self, name: &str, contents: &str) -> HarnessResult<PathBuf> {
        let path = self.runner.resolve_script(&self.dir.path().join(name))?;
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// Run a script from the sandbox; returns the merged output and the same output split on `\n`.
    pub fn launch(&self, name: &str) -> HarnessResult<(String, Vec<String>)> {
        self.launch_with(name, &[], None)
    }

    pub fn launch_with(
        &self,
        name: &str,
        env: &[(String, String)],
        timeout: Option<Duration>,
    ) -> HarnessResult<(String, Vec<String>)> {
        let outcome = self.runner.run_script(&self.dir.path().join(name), env, timeout)?;
        Ok((outcome.output_text().into_owned(), outcome.lines()))
    }
}
