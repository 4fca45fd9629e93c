//! Wire contract between the harness and the image under test.
//!
//! The target emits framed lines over its console: harness-relevant lines
//! carry a fixed prefix, control messages use bracketed markers, and a
//! sentinel line reports orderly completion. Everything here is pure string
//! processing so it can be exercised without booting anything.

use serde::Deserialize;

use crate::error::HarnessError;

/// Prefix the target puts on every line addressed to the harness.
pub const LOG_PREFIX: &str = "[hftest] ";

/// Start of a failure line emitted by a failing assertion on the target.
pub const FAILURE_PREFIX: &str = "Failure:";

/// Sentinel logged by the target once a run finished in an orderly way.
pub const FINISHED: &str = "FINISHED";

/// Control marker: the target is waiting for its command line.
pub const CTRL_GET_COMMAND_LINE: &str = "[hftest_ctrl:get_command_line]";

/// Control marker: the target finished the run and is about to reboot.
pub const CTRL_FINISHED: &str = "[hftest_ctrl:finished]";

/// Width of the per-VM tag multi-VM images put in front of every line,
/// as in "VM 0: ".
const VM_TAG_WIDTH: usize = "VM 0: ".len();

/// Pulls the harness-addressed lines out of raw console output.
///
/// Lines break on `\r` as well as `\n`, so a marker written after a bare
/// carriage return is still seen. Lines tagged with a VM identifier have
/// the fixed-width tag removed first. Only lines carrying [`LOG_PREFIX`]
/// after that are kept, with the prefix stripped.
pub fn extract_log_lines(raw: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    for line in raw.split(['\r', '\n']) {
        let line = if line.starts_with("VM ") {
            line.get(VM_TAG_WIDTH..).unwrap_or("")
        } else {
            line
        };
        if let Some(rest) = line.strip_prefix(LOG_PREFIX) {
            lines.push(rest);
        }
    }
    lines
}

/// One runnable test as announced by the image.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TestCase {
    pub name: String,
    pub is_long_running: bool,
}

/// A named group of tests.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TestSuite {
    pub name: String,
    pub tests: Vec<TestCase>,
}

/// Everything the image offers to run, in the image's own order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TestCatalog {
    pub suites: Vec<TestSuite>,
}

/// Parses the discovery payload printed by the image's `json` command.
pub fn parse_catalog(lines: &[&str]) -> Result<TestCatalog, HarnessError> {
    Ok(serde_json::from_str(&lines.join("\n"))?)
}

/// Outcome of one test invocation, judged from its log lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    /// Carries the extracted failure message.
    Failed(String),
}

/// Classifies a run from its prefix-stripped log lines.
///
/// A run passed when the last line is the completion sentinel and no line
/// reports a failure. Anything else failed, including a log that simply
/// stops (crash or expired deadline).
pub fn classify(lines: &[&str]) -> Verdict {
    let passed = lines.last() == Some(&FINISHED)
        && !lines.iter().any(|line| line.starts_with(FAILURE_PREFIX));
    if passed {
        Verdict::Passed
    } else {
        Verdict::Failed(failure_message(lines).unwrap_or_else(|| "Test failed".to_string()))
    }
}

/// The line following the first failure marker, trimmed.
///
/// The target logs the human-readable reason on the line after the marker.
/// Returns `None` when no marker is present or nothing follows it.
pub fn failure_message(lines: &[&str]) -> Option<String> {
    for (i, line) in lines.iter().enumerate() {
        if line.starts_with(FAILURE_PREFIX) {
            return lines.get(i + 1).map(|msg| msg.trim().to_string());
        }
    }
    None
}
