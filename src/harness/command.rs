//! Executable lookup on `PATH`.

use std::env;
use std::ffi::OsString;
use std::path::PathBuf;

use nix::unistd::{AccessFlags, access};

use super::errors::{HarnessError, HarnessResult};

const FALLBACK_PATH: &str = "/usr/bin:/usr/sbin";

/// Find `command` in `PATH` (or `/usr/bin:/usr/sbin` when `PATH` is unset).
pub fn find_command(command: &str) -> HarnessResult<PathBuf> {
    let search = env::var_os("PATH").unwrap_or_else(|| OsString::from(FALLBACK_PATH));
    find_command_in(command, &search)
}

/// Find `command` in an explicit search path.
pub fn find_command_in(command: &str, search: &OsString) -> HarnessResult<PathBuf> {
    env::split_paths(search)
        .map(|dir| dir.join(command))
        .find(|candidate| candidate.is_file() && access(candidate, AccessFlags::X_OK).is_ok())
        .ok_or_else(|| HarnessError::CommandNotFound {
            command: command.to_string(),
        })
}
