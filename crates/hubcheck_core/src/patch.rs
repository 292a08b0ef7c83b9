//! Runtime-patching selection and bookkeeping.
//!
//! A [`PatchRequest`] selects modules either with a blanket `all` switch or per module. Resolution follows one
//! rule: when `all` is not given, it defaults to `true` unless some module is explicitly requested `true`; every
//! module the request does not mention then takes the `all` value. So `socket=false` patches everything except
//! `socket`, while `socket=true` patches only `socket`.
//!
//! [`PatchRegistry`] applies requests cumulatively and records exactly which modules are patched.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;
use tracing::debug;

/// Modules patched by a blanket request.
pub const DEFAULT_MODULES: [&str; 5] = ["os", "select", "socket", "thread", "time"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("unexpected patch selector {0:?}")]
    UnknownModule(String),
}

/// Which modules to patch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchRequest {
    all: Option<bool>,
    modules: BTreeMap<String, bool>,
}

impl PatchRequest {
    /// A request with no explicit selection (patches every known module).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the blanket switch.
    pub fn with_all(mut self, on: bool) -> Self {
        self.all = Some(on);
        self
    }

    /// Select or deselect a single module.
    pub fn module(mut self, name: impl Into<String>, on: bool) -> Self {
        self.modules.insert(name.into(), on);
        self
    }

    /// Decide, for every known module, whether this request patches it.
    fn resolve<'a>(&self, known: &'a BTreeSet<String>) -> Result<Vec<&'a str>, PatchError> {
        if let Some(unknown) = self.modules.keys().find(|name| !known.contains(*name)) {
            return Err(PatchError::UnknownModule(unknown.clone()));
        }

        let default_on = self.all.unwrap_or_else(|| !self.modules.values().any(|on| *on));

        Ok(known
            .iter()
            .filter(|name| self.modules.get(*name).copied().unwrap_or(default_on))
            .map(String::as_str)
            .collect())
    }
}

/// The patch-application surface the harness and isolated scripts rely on.
pub trait Patcher {
    /// Apply a request. Returns the modules newly patched by this call.
    fn apply(&mut self, request: &PatchRequest) -> Result<Vec<String>, PatchError>;

    /// Whether `module` is currently patched.
    fn is_patched(&self, module: &str) -> bool;

    /// All patched modules, sorted.
    fn patched_modules(&self) -> Vec<String>;
}

/// Reference [`Patcher`] that only records state.
#[derive(Debug, Clone)]
pub struct PatchRegistry {
    known: BTreeSet<String>,
    patched: BTreeSet<String>,
}

impl Default for PatchRegistry {
    fn default() -> Self {
        Self::with_modules(DEFAULT_MODULES)
    }
}

impl PatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that accepts exactly `modules`.
    pub fn with_modules<I, S>(modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known: modules.into_iter().map(Into::into).collect(),
            patched: BTreeSet::new(),
        }
    }
}

impl Patcher for PatchRegistry {
    fn apply(&mut self, request: &PatchRequest) -> Result<Vec<String>, PatchError> {
        let selected = request.resolve(&self.known)?;
        let mut newly = Vec::new();
        for name in selected {
            if self.patched.insert(name.to_string()) {
                debug!(module = name, "patched");
                newly.push(name.to_string());
            }
        }
        Ok(newly)
    }

    fn is_patched(&self, module: &str) -> bool {
        self.patched.contains(module)
    }

    fn patched_modules(&self) -> Vec<String> {
        self.patched.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patched_after(request: PatchRequest) -> String {
        let mut registry = PatchRegistry::new();
        registry.apply(&request).unwrap();
        registry.patched_modules().join(",")
    }

    #[test]
    fn test_blanket_request() {
        assert_eq!(patched_after(PatchRequest::new()), "os,select,socket,thread,time");
        assert_eq!(
            patched_after(PatchRequest::new().with_all(true)),
            "os,select,socket,thread,time"
        );
    }

    #[test]
    fn test_all_with_single_module() {
        assert_eq!(
            patched_after(PatchRequest::new().with_all(true).module("socket", true)),
            "os,select,socket,thread,time"
        );
    }

    #[test]
    fn test_all_negative() {
        let request = PatchRequest::new()
            .with_all(false)
            .module("socket", false)
            .module("select", true);
        assert_eq!(patched_after(request), "select");
    }

    #[test]
    fn test_single_and_double_selection() {
        assert_eq!(patched_after(PatchRequest::new().module("socket", true)), "socket");
        assert_eq!(
            patched_after(PatchRequest::new().module("socket", true).module("select", true)),
            "select,socket"
        );
    }

    #[test]
    fn test_negative_selection() {
        assert_eq!(
            patched_after(PatchRequest::new().module("socket", false)),
            "os,select,thread,time"
        );
        assert_eq!(
            patched_after(PatchRequest::new().module("socket", false).module("time", false)),
            "os,select,thread"
        );
    }

    #[test]
    fn test_conflicting_requests() {
        assert_eq!(
            patched_after(PatchRequest::new().module("socket", false).module("select", true)),
            "select"
        );
    }

    #[test]
    fn test_unknown_module_is_rejected_before_patching() {
        let mut registry = PatchRegistry::new();
        let err = registry
            .apply(&PatchRequest::new().module("finagle", true))
            .unwrap_err();
        assert!(err.to_string().contains("finagle"));
        assert!(registry.patched_modules().is_empty());
    }

    #[test]
    fn test_apply_is_cumulative_and_idempotent() {
        let mut registry = PatchRegistry::new();
        let first = registry.apply(&PatchRequest::new().module("socket", true)).unwrap();
        assert_eq!(first, vec!["socket".to_string()]);
        let again = registry.apply(&PatchRequest::new().module("socket", true)).unwrap();
        assert!(again.is_empty());
        registry.apply(&PatchRequest::new().module("time", true)).unwrap();

        assert!(registry.is_patched("socket"));
        assert!(registry.is_patched("time"));
        assert!(!registry.is_patched("os"));
        assert_eq!(registry.patched_modules(), vec!["socket", "time"]);
    }
}
