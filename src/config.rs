//! Harness configuration
//!
//! Defaults suit shell scripts; every field can be overridden through `HUBCHECK_*` environment variables and then
//! through CLI flags.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::harness::{DEFAULT_TIMEOUT, HarnessError, HarnessResult};

/// Harness configuration
#[derive(Debug, Clone, PartialEq)]
pub struct HarnessConfig {
    /// Deadline for isolated scripts that do not pass their own
    pub default_timeout: Duration,
    /// Program that runs each script (absolute path or a name looked up on `PATH`)
    pub interpreter: PathBuf,
    /// Extension appended to script paths that lack one
    pub script_extension: String,
    /// Environment variable children use as their module search path
    pub search_path_var: String,
    /// Directories appended to the child's module search path
    pub search_roots: Vec<PathBuf>,
    /// Directory isolated script names are resolved against
    pub isolated_dir: PathBuf,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
            interpreter: PathBuf::from("/bin/sh"),
            script_extension: "sh".to_string(),
            search_path_var: "HUBCHECK_PATH".to_string(),
            search_roots: vec![PathBuf::from(".")],
            isolated_dir: PathBuf::from("tests/isolated"),
        }
    }
}

impl HarnessConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<PathBuf>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    /// Leading dots are stripped (`.sh` and `sh` are the same).
    pub fn with_script_extension(mut self, extension: impl Into<String>) -> Self {
        self.script_extension = extension.into().trim_start_matches('.').to_string();
        self
    }

    pub fn with_search_path_var(mut self, var: impl Into<String>) -> Self {
        self.search_path_var = var.into();
        self
    }

    pub fn with_search_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.search_roots = roots;
        self
    }

    pub fn with_isolated_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.isolated_dir = dir.into();
        self
    }

    /// Defaults overridden by `HUBCHECK_*` variables from the process environment.
    pub fn from_env() -> HarnessResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each `HUBCHECK_*` key.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> HarnessResult<Self> {
        let mut config = Self::default();
        if let Some(raw) = lookup("HUBCHECK_TIMEOUT") {
            config.default_timeout = parse_timeout(&raw)?;
        }
        if let Some(interpreter) = lookup("HUBCHECK_INTERPRETER") {
            config = config.with_interpreter(interpreter);
        }
        if let Some(extension) = lookup("HUBCHECK_EXTENSION") {
            config = config.with_script_extension(extension);
        }
        if let Some(var) = lookup("HUBCHECK_SEARCH_PATH_VAR") {
            config = config.with_search_path_var(var);
        }
        if let Some(dir) = lookup("HUBCHECK_ISOLATED_DIR") {
            config = config.with_isolated_dir(dir);
        }
        Ok(config)
    }
}

/// Parse a positive number of seconds (fractions allowed).
pub fn parse_timeout(raw: &str) -> HarnessResult<Duration> {
    let seconds: f64 = raw
        .trim()
        .parse()
        .map_err(|_| HarnessError::Config(format!("timeout must be a number of seconds, got {raw:?}")))?;
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(HarnessError::Config(format!("timeout must be positive, got {raw:?}")));
    }
    Duration::try_from_secs_f64(seconds).map_err(|e| HarnessError::Config(format!("timeout {raw:?} out of range: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.default_timeout, Duration::from_secs(10));
        assert_eq!(config.interpreter, PathBuf::from("/bin/sh"));
        assert_eq!(config.script_extension, "sh");
        assert_eq!(config.search_path_var, "HUBCHECK_PATH");
        assert_eq!(config.isolated_dir, PathBuf::from("tests/isolated"));
    }

    #[test]
    fn test_builder() {
        let config = HarnessConfig::new()
            .with_default_timeout(Duration::from_secs(3))
            .with_interpreter("python3")
            .with_script_extension(".py")
            .with_search_path_var("PYTHONPATH")
            .with_search_roots(vec![PathBuf::from("src")])
            .with_isolated_dir("isolated");
        assert_eq!(config.default_timeout, Duration::from_secs(3));
        assert_eq!(config.interpreter, PathBuf::from("python3"));
        assert_eq!(config.script_extension, "py");
        assert_eq!(config.search_path_var, "PYTHONPATH");
        assert_eq!(config.search_roots, vec![PathBuf::from("src")]);
        assert_eq!(config.isolated_dir, PathBuf::from("isolated"));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("HUBCHECK_TIMEOUT", "2.5"),
            ("HUBCHECK_INTERPRETER", "/usr/bin/python3"),
            ("HUBCHECK_EXTENSION", "py"),
        ]
        .into_iter()
        .collect();
        let config = HarnessConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(config.default_timeout, Duration::from_millis(2500));
        assert_eq!(config.interpreter, PathBuf::from("/usr/bin/python3"));
        assert_eq!(config.script_extension, "py");
        assert_eq!(config.search_path_var, "HUBCHECK_PATH");
    }

    #[test]
    fn test_bad_timeout_is_rejected() {
        assert!(parse_timeout("abc").is_err());
        assert!(parse_timeout("0").is_err());
        assert!(parse_timeout("-1").is_err());
        assert!(parse_timeout("inf").is_err());
        assert!(parse_timeout("1e30").is_err());
        assert_eq!(parse_timeout(" 1 ").unwrap(), Duration::from_secs(1));

        let err =
            HarnessConfig::from_lookup(|key| (key == "HUBCHECK_TIMEOUT").then(|| "soon".to_string())).unwrap_err();
        assert!(matches!(err, HarnessError::Config(_)));
    }
}
