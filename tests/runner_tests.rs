//! End-to-end runner behavior against a scripted driver.
//!
//! The fake driver answers discovery with a fixed catalog and replays
//! canned console output per test, so selection, ordering, classification
//! and reporting can be checked without booting anything.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

use hftest::driver::Driver;
use hftest::report::TestCounts;
use hftest::runner::TestRunner;
use hftest::{HarnessError, protocol};

/// One recorded driver invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Invocation {
    run_name: String,
    test_args: String,
    is_long_running: bool,
}

impl Invocation {
    fn new(run_name: &str, test_args: &str, is_long_running: bool) -> Self {
        Self {
            run_name: run_name.to_string(),
            test_args: test_args.to_string(),
            is_long_running,
        }
    }
}

#[derive(Debug, Default)]
struct DriverLog {
    invocations: Vec<Invocation>,
    finish_calls: usize,
}

/// Driver stand-in replaying scripted console output.
struct FakeDriver {
    catalog: &'static str,
    /// Target log lines (without the log prefix) keyed by test args.
    /// Unscripted tests pass with a bare sentinel.
    outputs: HashMap<&'static str, Vec<&'static str>>,
    cpu: Option<String>,
    log: Rc<RefCell<DriverLog>>,
}

impl FakeDriver {
    fn new(catalog: &'static str) -> (Self, Rc<RefCell<DriverLog>>) {
        let log = Rc::new(RefCell::new(DriverLog::default()));
        let driver = Self {
            catalog,
            outputs: HashMap::new(),
            cpu: None,
            log: Rc::clone(&log),
        };
        (driver, log)
    }

    fn script(mut self, test_args: &'static str, lines: &[&'static str]) -> Self {
        self.outputs.insert(test_args, lines.to_vec());
        self
    }
}

impl Driver for FakeDriver {
    fn run(&mut self, run_name: &str, test_args: &str, is_long_running: bool) -> Result<String, HarnessError> {
        self.log
            .borrow_mut()
            .invocations
            .push(Invocation::new(run_name, test_args, is_long_running));
        let lines: Vec<String> = if test_args == "json" {
            self.catalog
                .lines()
                .map(|line| format!("{}{}", protocol::LOG_PREFIX, line))
                .collect()
        } else {
            self.outputs
                .get(test_args)
                .cloned()
                .unwrap_or_else(|| vec!["FINISHED"])
                .into_iter()
                .map(|line| format!("{}{}", protocol::LOG_PREFIX, line))
                .collect()
        };
        let mut out = lines.join("\n");
        out.push('\n');
        Ok(out)
    }

    fn finish(&mut self) -> Result<(), HarnessError> {
        self.log.borrow_mut().finish_calls += 1;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "FakeDriver"
    }

    fn cpu(&self) -> Option<&str> {
        self.cpu.as_deref()
    }

    fn run_log(&self, run_name: &str) -> Result<PathBuf, HarnessError> {
        Ok(PathBuf::from(format!("{run_name}.log")))
    }
}

const TWO_SUITES: &str = r#"{"suites": [
  {"name": "s1", "tests": [
    {"name": "t1", "is_long_running": false},
    {"name": "slow", "is_long_running": true}]},
  {"name": "s2", "tests": [
    {"name": "t2", "is_long_running": false}]}
]}"#;

struct Session {
    runner: TestRunner,
    report_path: PathBuf,
    _dir: tempfile::TempDir,
}

fn session(
    driver: FakeDriver,
    suite_filter: Option<&str>,
    test_filter: Option<&str>,
    skip_long_running: bool,
    force_long_running: bool,
) -> Session {
    let dir = tempfile::tempdir().unwrap();
    let report_path = dir.path().join("report.xml");
    let runner = TestRunner::new(
        Box::new(driver),
        "test_image",
        suite_filter,
        test_filter,
        skip_long_running,
        force_long_running,
        report_path.clone(),
    )
    .unwrap();
    Session { runner, report_path, _dir: dir }
}

#[test]
fn runs_every_test_in_catalog_order() {
    let (driver, log) = FakeDriver::new(TWO_SUITES);
    let mut session = session(driver, None, None, false, false);
    let counts = session.runner.run_all().unwrap();

    assert_eq!(counts, TestCounts { run: 3, failed: 0, skipped: 0 });
    let log = log.borrow();
    assert_eq!(
        log.invocations,
        vec![
            Invocation::new("json", "json", false),
            Invocation::new("s1.t1", "run s1 t1", false),
            Invocation::new("s1.slow", "run s1 slow", true),
            Invocation::new("s2.t2", "run s2 t2", false),
        ]
    );
    assert_eq!(log.finish_calls, 1);
}

#[test]
fn failure_is_classified_and_counted() {
    let (driver, _log) = FakeDriver::new(TWO_SUITES);
    let driver = driver.script("run s1 t1", &["Running t1", "Failure:", "  bad state", "FINISHED"]);
    let mut session = session(driver, None, None, false, false);
    let counts = session.runner.run_all().unwrap();

    assert_eq!(counts, TestCounts { run: 3, failed: 1, skipped: 0 });
    let xml = std::fs::read_to_string(&session.report_path).unwrap();
    assert!(xml.contains("<failure message=\"bad state\">"));
    assert!(xml.contains("<testcase name=\"t1\" classname=\"s1\" status=\"run\""));
}

#[test]
fn truncated_output_fails_with_fallback_message() {
    let (driver, _log) = FakeDriver::new(TWO_SUITES);
    let driver = driver.script("run s2 t2", &["Running t2"]);
    let mut session = session(driver, None, None, false, false);
    let counts = session.runner.run_all().unwrap();

    assert_eq!(counts.failed, 1);
    let xml = std::fs::read_to_string(&session.report_path).unwrap();
    assert!(xml.contains("<failure message=\"Test failed\">"));
}

#[test]
fn long_running_tests_are_skipped_without_booting() {
    let (driver, log) = FakeDriver::new(TWO_SUITES);
    let mut session = session(driver, None, None, true, false);
    let counts = session.runner.run_all().unwrap();

    assert_eq!(counts, TestCounts { run: 2, failed: 0, skipped: 1 });
    let log = log.borrow();
    assert!(log.invocations.iter().all(|call| call.test_args != "run s1 slow"));
    let xml = std::fs::read_to_string(&session.report_path).unwrap();
    assert!(xml.contains("<testcase name=\"slow\" classname=\"s1\" status=\"notrun\">"));
    assert!(xml.contains("<skipped message=\"Long running\"/>"));
}

#[test]
fn force_long_running_applies_to_every_invocation() {
    let (driver, log) = FakeDriver::new(TWO_SUITES);
    let mut session = session(driver, None, None, false, true);
    session.runner.run_all().unwrap();

    let log = log.borrow();
    assert!(log.invocations.iter().all(|call| call.is_long_running));
}

#[test]
fn suite_filter_selects_whole_suites() {
    let (driver, log) = FakeDriver::new(TWO_SUITES);
    let mut session = session(driver, Some("s2"), None, false, false);
    let counts = session.runner.run_all().unwrap();

    assert_eq!(counts, TestCounts { run: 1, failed: 0, skipped: 0 });
    let log = log.borrow();
    assert_eq!(log.invocations.len(), 2);
    assert_eq!(log.invocations[1].test_args, "run s2 t2");
    // Filtered-out suites leave no trace in the report.
    let xml = std::fs::read_to_string(&session.report_path).unwrap();
    assert!(!xml.contains("<testsuite name=\"s1\""));
}

#[test]
fn test_filter_matches_at_name_start() {
    let (driver, log) = FakeDriver::new(TWO_SUITES);
    // "t" matches t1 and t2 but not "slow".
    let mut session = session(driver, None, Some("t"), false, false);
    let counts = session.runner.run_all().unwrap();

    assert_eq!(counts, TestCounts { run: 2, failed: 0, skipped: 0 });
    let log = log.borrow();
    assert!(log.invocations.iter().all(|call| call.test_args != "run s1 slow"));
}

#[test]
fn anchored_filter_missing_everything_selects_nothing() {
    let (driver, log) = FakeDriver::new(r#"{"suites": [{"name": "s1", "tests": [{"name": "t1", "is_long_running": false}]}]}"#);
    let mut session = session(driver, Some("^s2$"), None, false, false);
    let counts = session.runner.run_all().unwrap();

    assert_eq!(counts, TestCounts { run: 0, failed: 0, skipped: 0 });
    // Only discovery ran.
    assert_eq!(log.borrow().invocations.len(), 1);
    // The report still exists, with empty totals.
    let xml = std::fs::read_to_string(&session.report_path).unwrap();
    assert!(xml.contains("tests=\"0\" failures=\"0\" skipped=\"0\""));
}

#[test]
fn malformed_catalog_aborts_the_session() {
    let (driver, log) = FakeDriver::new("json would go here, but this is not it");
    let mut session = session(driver, None, None, false, false);
    let err = session.runner.run_all().unwrap_err();

    assert!(matches!(err, HarnessError::CatalogJson(_)));
    assert_eq!(log.borrow().finish_calls, 0);
    assert!(!session.report_path.exists());
}

#[test]
fn cpu_model_prefixes_run_log_names() {
    let (mut driver, log) = FakeDriver::new(TWO_SUITES);
    driver.cpu = Some("cortex-a57".to_string());
    let mut session = session(driver, Some("s1"), Some("t1"), false, false);
    session.runner.run_all().unwrap();

    let log = log.borrow();
    assert_eq!(log.invocations[1].run_name, "cortex-a57.s1.t1");
}

#[test]
fn cpu_model_is_recorded_as_a_suite_property() {
    let (mut driver, _log) = FakeDriver::new(TWO_SUITES);
    driver.cpu = Some("cortex-a57".to_string());
    let mut session = session(driver, Some("s1"), Some("t1"), false, false);
    session.runner.run_all().unwrap();

    let xml = std::fs::read_to_string(&session.report_path).unwrap();
    assert!(xml.contains("<property name=\"driver\" value=\"FakeDriver\"/>"));
    assert!(xml.contains("<property name=\"cpu\" value=\"cortex-a57\"/>"));
}

#[test]
fn report_shape_matches_collector_expectations() {
    let (driver, _log) = FakeDriver::new(
        r#"{"suites": [{"name": "s1", "tests": [
          {"name": "t1", "is_long_running": false},
          {"name": "slow", "is_long_running": true}]}]}"#,
    );
    let driver = driver.script("run s1 t1", &["Running t1", "FINISHED"]);
    let mut session = session(driver, None, None, true, false);
    session.runner.run_all().unwrap();

    let xml = std::fs::read_to_string(&session.report_path).unwrap();
    insta::with_settings!({filters => vec![
        (r#"time="[0-9.]+""#, r#"time="[TIME]""#),
        (r#"timestamp="[^"]+""#, r#"timestamp="[TS]""#),
    ]}, {
        insta::assert_snapshot!(xml, @r#"
        <?xml version="1.0" encoding="utf-8"?><testsuites name="test_image" timestamp="[TS]" tests="2" failures="0" skipped="1" time="[TIME]"><testsuite name="s1" tests="2" failures="0" skipped="1" time="[TIME]"><properties><property name="driver" value="FakeDriver"/></properties><testcase name="t1" classname="s1" status="run" time="[TIME]"><system-out>[hftest] Running t1
        [hftest] FINISHED
        </system-out></testcase><testcase name="slow" classname="s1" status="notrun"><skipped message="Long running"/></testcase></testsuite></testsuites>
        "#);
    });
}
