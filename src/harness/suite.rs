//! Isolated suite runner
//!
//! ## TestReporter Trait
//!
//! Running and reporting are separate: the runner walks the discovered scripts and hands every event to a
//! `TestReporter`. `ConsoleReporter` prints pytest-style progress to stderr, `JsonReporter` writes one JSON
//! document when the run completes.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde_json::json;
use tracing::{info, warn};

use super::errors::HarnessResult;
use super::isolation::IsolationRunner;
use super::protocol::ProtocolVerdict;

// ============================================================================
// Test Reporter Trait
// ============================================================================

/// Trait for reporting suite progress.
pub trait TestReporter {
    /// Called when discovery begins
    fn on_discovery_start(&mut self, _path: &Path) {}

    /// Called once every script has been collected and filtered
    fn on_collection_complete(&mut self, test_count: usize);

    /// Called before a script runs
    fn on_test_start(&mut self, _test: &ScriptInfo) {}

    /// Called when a script finished
    fn on_test_complete(&mut self, test: &ScriptInfo, result: &TestResult);

    /// Called when the run is over (also after stopping early)
    fn on_run_complete(&mut self, summary: &TestSummary);
}

/// A discovered isolated script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptInfo {
    pub path: PathBuf,
    /// Path relative to the discovery root, used for filtering and display.
    pub name: String,
}

/// Result of running a single script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestResult {
    Passed(Duration),
    Failed(Duration, String),
    Skipped(String),
}

/// Summary of a suite run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration: Duration,
}

impl TestSummary {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    fn record(&mut self, result: &TestResult) {
        match result {
            TestResult::Passed(_) => self.passed += 1,
            TestResult::Failed(..) => self.failed += 1,
            TestResult::Skipped(_) => self.skipped += 1,
        }
    }
}

/// Knobs for [`run_suite`].
#[derive(Debug, Clone, Default)]
pub struct SuiteOptions {
    /// Only run scripts whose name contains this keyword
    pub filter: Option<String>,
    /// Stop after the first failure
    pub stop_on_fail: bool,
    pub env: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

// ============================================================================
// Console reporter
// ============================================================================

/// Default console reporter (pytest-style)
#[derive(Default)]
pub struct ConsoleReporter {
    pub verbose: bool,
}

impl ConsoleReporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl TestReporter for ConsoleReporter {
    fn on_collection_complete(&mut self, test_count: usize) {
        if test_count == 0 {
            eprintln!("No scripts collected");
        } else {
            eprintln!("\x1b[1m=================== isolated session starts ===================\x1b[0m");
            eprintln!("collected {} script(s)", test_count);
            eprintln!();
        }
    }

    fn on_test_start(&mut self, test: &ScriptInfo) {
        if self.verbose {
            eprint!("{} ... ", test.name);
        }
    }

    fn on_test_complete(&mut self, test: &ScriptInfo, result: &TestResult) {
        let status = match result {
            TestResult::Passed(d) => {
                if self.verbose {
                    format!("\x1b[32mPASSED\x1b[0m ({}ms)", d.as_millis())
                } else {
                    "\x1b[32m.\x1b[0m".to_string()
                }
            }
            TestResult::Failed(d, _) => {
                if self.verbose {
                    format!("\x1b[31mFAILED\x1b[0m ({}ms)", d.as_millis())
                } else {
                    "\x1b[31mF\x1b[0m".to_string()
                }
            }
            TestResult::Skipped(reason) if reason.is_empty() => "\x1b[33mSKIPPED\x1b[0m".to_string(),
            TestResult::Skipped(reason) => format!("\x1b[33mSKIPPED\x1b[0m ({})", reason),
        };

        if self.verbose {
            eprintln!("{}", status);
        } else {
            eprint!("{}", status);
        }

        if let TestResult::Failed(_, error) = result {
            eprintln!("\n\x1b[31m{}\x1b[0m", test.name);
            eprintln!("{}", error);
        }
    }

    fn on_run_complete(&mut self, summary: &TestSummary) {
        if !self.verbose {
            eprintln!();
        }
        eprintln!();

        let mut parts = Vec::new();
        if summary.passed > 0 {
            parts.push(format!("\x1b[32m{} passed\x1b[0m", summary.passed));
        }
        if summary.failed > 0 {
            parts.push(format!("\x1b[31m{} failed\x1b[0m", summary.failed));
        }
        if summary.skipped > 0 {
            parts.push(format!("\x1b[33m{} skipped\x1b[0m", summary.skipped));
        }
        if parts.is_empty() {
            parts.push("no scripts ran".to_string());
        }

        eprintln!(
            "====== {} in {:.2}s ======",
            parts.join(", "),
            summary.duration.as_secs_f64()
        );
    }
}

// ============================================================================
// JSON reporter
// ============================================================================

/// Collects results and writes a single JSON document on completion.
pub struct JsonReporter<W: Write> {
    out: W,
    tests: Vec<serde_json::Value>,
}

impl<W: Write> JsonReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out, tests: Vec::new() }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> TestReporter for JsonReporter<W> {
    fn on_collection_complete(&mut self, _test_count: usize) {}

    fn on_test_complete(&mut self, test: &ScriptInfo, result: &TestResult) {
        let entry = match result {
            TestResult::Passed(d) => json!({
                "name": test.name,
                "outcome": "passed",
                "duration_ms": (d.as_millis() as u64),
            }),
            TestResult::Failed(d, message) => json!({
                "name": test.name,
                "outcome": "failed",
                "duration_ms": (d.as_millis() as u64),
                "message": message,
            }),
            TestResult::Skipped(reason) => {
                let reason = (!reason.is_empty()).then_some(reason);
                json!({
                    "name": test.name,
                    "outcome": "skipped",
                    "reason": reason,
                })
            }
        };
        self.tests.push(entry);
    }

    fn on_run_complete(&mut self, summary: &TestSummary) {
        let document = json!({
            "summary": {
                "total": summary.total,
                "passed": summary.passed,
                "failed": summary.failed,
                "skipped": summary.skipped,
                "duration_secs": summary.duration.as_secs_f64(),
            },
            "tests": std::mem::take(&mut self.tests),
        });
        let written = serde_json::to_writer_pretty(&mut self.out, &document)
            .map_err(std::io::Error::from)
            .and_then(|()| writeln!(self.out));
        if let Err(err) = written {
            warn!(%err, "failed to write JSON report");
        }
    }
}

// ============================================================================
// Discovery and execution
// ============================================================================

/// Find every script with `extension` under `path`, sorted. A file path is returned as is when it matches.
pub fn discover_scripts(path: &Path, extension: &str) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let matches = |p: &Path| p.extension().is_some_and(|ext| ext == extension);

    if path.is_file() {
        if matches(path) {
            files.push(path.to_path_buf());
        }
    } else if path.is_dir() {
        if let Ok(entries) = fs::read_dir(path) {
            for entry in entries.flatten() {
                let entry_path = entry.path();
                let name = entry_path.file_name().and_then(|n| n.to_str()).unwrap_or("");
                if entry_path.is_dir() {
                    if !name.starts_with('.') && name != "target" {
                        files.extend(discover_scripts(&entry_path, extension));
                    }
                } else if !name.starts_with('.') && matches(&entry_path) {
                    files.push(entry_path);
                }
            }
        }
    }

    files.sort();
    files
}

fn script_info(root: &Path, path: PathBuf) -> ScriptInfo {
    let name = path
        .strip_prefix(root)
        .ok()
        .filter(|rel| !rel.as_os_str().is_empty())
        .unwrap_or(path.as_path())
        .to_string_lossy()
        .into_owned();
    ScriptInfo { path, name }
}

/// Run every isolated script under `path` and report through `reporter`.
///
/// A missing interpreter fails the whole run up front; anything a single script does (including timing out) only
/// fails that script.
pub fn run_suite(
    runner: &IsolationRunner,
    path: &Path,
    options: &SuiteOptions,
    reporter: &mut dyn TestReporter,
) -> HarnessResult<TestSummary> {
    let start = Instant::now();
    runner.interpreter()?;

    reporter.on_discovery_start(path);
    let root = std::path::absolute(path)?;
    let scripts: Vec<ScriptInfo> = discover_scripts(&root, &runner.config().script_extension)
        .into_iter()
        .map(|script| script_info(&root, script))
        .filter(|script| options.filter.as_deref().is_none_or(|keyword| script.name.contains(keyword)))
        .collect();
    reporter.on_collection_complete(scripts.len());
    info!(root = %root.display(), count = scripts.len(), "collected isolated scripts");

    let mut summary = TestSummary {
        total: scripts.len(),
        ..TestSummary::default()
    };

    for script in &scripts {
        reporter.on_test_start(script);
        let started = Instant::now();
        let result = match runner.run_isolated_verdict(&script.path, &options.env, options.timeout) {
            Ok(ProtocolVerdict::Pass) => TestResult::Passed(started.elapsed()),
            Ok(ProtocolVerdict::Skip(reason)) => TestResult::Skipped(reason.unwrap_or_default()),
            Ok(ProtocolVerdict::Fail(output)) => TestResult::Failed(started.elapsed(), output),
            Err(err) => TestResult::Failed(started.elapsed(), err.to_string()),
        };
        reporter.on_test_complete(script, &result);
        summary.record(&result);

        if options.stop_on_fail && matches!(result, TestResult::Failed(..)) {
            info!(script = %script.name, "stopping after first failure");
            break;
        }
    }

    summary.duration = start.elapsed();
    reporter.on_run_complete(&summary);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_is_sorted_and_filtered_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::create_dir(dir.path().join(".hidden")).unwrap();
        for name in ["b.sh", "a.sh", "notes.txt", "nested/c.sh", ".hidden/d.sh"] {
            fs::write(dir.path().join(name), "echo pass\n").unwrap();
        }

        let found: Vec<String> = discover_scripts(dir.path(), "sh")
            .into_iter()
            .map(|p| script_info(dir.path(), p).name)
            .collect();
        assert_eq!(found, vec!["a.sh", "b.sh", "nested/c.sh"]);
    }

    #[test]
    fn test_single_file_is_discovered() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("only.sh");
        fs::write(&script, "echo pass\n").unwrap();
        assert_eq!(discover_scripts(&script, "sh"), vec![script.clone()]);
        assert_eq!(script_info(&script, script.clone()).name, script.to_string_lossy());
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = TestSummary::default();
        summary.record(&TestResult::Passed(Duration::ZERO));
        summary.record(&TestResult::Skipped(String::new()));
        assert!(summary.is_success());
        summary.record(&TestResult::Failed(Duration::ZERO, "boom".into()));
        assert_eq!((summary.passed, summary.failed, summary.skipped), (1, 1, 1));
        assert!(!summary.is_success());
    }

    #[test]
    fn test_json_report() {
        let mut reporter = JsonReporter::new(Vec::new());
        let script = ScriptInfo {
            path: PathBuf::from("/suite/db.sh"),
            name: "db.sh".to_string(),
        };
        reporter.on_test_complete(&script, &TestResult::Skipped("no-database".into()));
        reporter.on_run_complete(&TestSummary {
            total: 1,
            skipped: 1,
            ..TestSummary::default()
        });

        let value: serde_json::Value = serde_json::from_slice(&reporter.into_inner()).unwrap();
        assert_eq!(value["summary"]["skipped"], 1);
        assert_eq!(value["tests"][0]["name"], "db.sh");
        assert_eq!(value["tests"][0]["outcome"], "skipped");
        assert_eq!(value["tests"][0]["reason"], "no-database");
    }
}
