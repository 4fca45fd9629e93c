//! Test selection, dispatch and result collection.

use std::path::PathBuf;
use std::time::Instant;

use regex::Regex;

use crate::driver::Driver;
use crate::error::HarnessError;
use crate::protocol::{self, TestCase, TestCatalog, TestSuite, Verdict};
use crate::report::{self, CaseReport, CaseStatus, FailureReport, Report, SuiteReport, TestCounts};

/// Runs the catalog a driver discovers and collects the results.
///
/// Suites and tests run strictly in catalog order, one invocation at a
/// time. Once the report is written, the driver's cleanup runs exactly
/// once.
pub struct TestRunner {
    driver: Box<dyn Driver>,
    image_name: String,
    suite_filter: Regex,
    test_filter: Regex,
    skip_long_running: bool,
    force_long_running: bool,
    report_path: PathBuf,
}

impl TestRunner {
    /// Filters follow match-at-start semantics: the pattern must match at
    /// the beginning of the name, with `.*` selecting everything.
    pub fn new(
        driver: Box<dyn Driver>,
        image_name: impl Into<String>,
        suite_filter: Option<&str>,
        test_filter: Option<&str>,
        skip_long_running: bool,
        force_long_running: bool,
        report_path: PathBuf,
    ) -> Result<Self, HarnessError> {
        Ok(Self {
            driver,
            image_name: image_name.into(),
            suite_filter: compile_filter("suite", suite_filter)?,
            test_filter: compile_filter("test", test_filter)?,
            skip_long_running,
            force_long_running,
            report_path,
        })
    }

    /// Asks the image what it can run.
    ///
    /// On a malformed payload the raw output is printed so the boot that
    /// produced it can be inspected.
    pub fn discover(&mut self) -> Result<TestCatalog, HarnessError> {
        let out = self.driver.run("json", "json", self.force_long_running)?;
        let lines = protocol::extract_log_lines(&out);
        match protocol::parse_catalog(&lines) {
            Ok(catalog) => {
                tracing::debug!(suites = catalog.suites.len(), "discovered test catalog");
                Ok(catalog)
            }
            Err(err) => {
                println!("{out}");
                Err(err)
            }
        }
    }

    /// Runs everything the filters select and writes the report.
    pub fn run_all(&mut self) -> Result<TestCounts, HarnessError> {
        let catalog = self.discover()?;
        let timestamp = chrono::Local::now().format("%Y-%m-%dT%H:%M:%S").to_string();
        let mut report = Report::new(&self.image_name, timestamp);

        let started = Instant::now();
        let mut counts = TestCounts::default();
        for suite in &catalog.suites {
            let sub = self.run_suite(suite, &mut report)?;
            debug_assert!(sub.run >= sub.failed);
            counts += sub;
        }
        report.counts = counts;
        report.time = started.elapsed().as_secs_f64();

        report::write_xml(&report, &self.report_path)?;
        tracing::debug!(path = %self.report_path.display(), "wrote report");

        if counts.failed > 0 {
            println!("[x] FAIL: {} of {} tests failed", counts.failed, counts.run);
        } else if counts.run > 0 {
            println!("    PASS: all {} tests passed", counts.run);
        }

        self.driver.finish()?;
        Ok(counts)
    }

    fn run_suite(&mut self, suite: &TestSuite, report: &mut Report) -> Result<TestCounts, HarnessError> {
        if !matches_from_start(&self.suite_filter, &suite.name) {
            return Ok(TestCounts::default());
        }
        println!("    SUITE {}", suite.name);

        let mut suite_report = SuiteReport::new(&suite.name);
        suite_report
            .properties
            .push(("driver".to_string(), self.driver.name().to_string()));
        if let Some(cpu) = self.driver.cpu() {
            suite_report.properties.push(("cpu".to_string(), cpu.to_string()));
        }

        let started = Instant::now();
        let mut counts = TestCounts::default();
        for test in &suite.tests {
            let sub = self.run_test(suite, test, &mut suite_report)?;
            debug_assert!(sub.run >= sub.failed);
            counts += sub;
        }
        suite_report.counts = counts;
        suite_report.time = started.elapsed().as_secs_f64();
        report.suites.push(suite_report);
        Ok(counts)
    }

    fn run_test(
        &mut self,
        suite: &TestSuite,
        test: &TestCase,
        suite_report: &mut SuiteReport,
    ) -> Result<TestCounts, HarnessError> {
        if !matches_from_start(&self.test_filter, &test.name) {
            return Ok(TestCounts::default());
        }

        let mut case = CaseReport::new(&test.name, &suite.name);
        if self.skip_long_running && test.is_long_running {
            println!("      SKIP {}", test.name);
            case.status = CaseStatus::NotRun;
            case.skipped = Some("Long running".to_string());
            suite_report.tests.push(case);
            return Ok(TestCounts { run: 0, failed: 0, skipped: 1 });
        }

        println!("      RUN {}", test.name);
        case.status = CaseStatus::Run;
        let log_name = self.log_name(suite, test);
        let test_args = format!("run {} {}", suite.name, test.name);
        let is_long_running = test.is_long_running || self.force_long_running;

        let started = Instant::now();
        let out = self.driver.run(&log_name, &test_args, is_long_running)?;
        case.time = Some(started.elapsed().as_secs_f64());

        let target_lines = protocol::extract_log_lines(&out);
        let verdict = protocol::classify(&target_lines);
        let target_text = target_lines.join("\n");
        case.system_out = Some(out);

        let counts = match verdict {
            Verdict::Passed => {
                println!("        PASS");
                TestCounts { run: 1, failed: 0, skipped: 0 }
            }
            Verdict::Failed(message) => {
                println!("[x]     FAIL -- {}", self.driver.run_log(&log_name)?.display());
                case.failure = Some(FailureReport { message, details: target_text });
                TestCounts { run: 1, failed: 1, skipped: 0 }
            }
        };
        suite_report.tests.push(case);
        Ok(counts)
    }

    /// Per-run log name, unique within the session. The CPU model is
    /// folded in so runs of the same test on different models coexist.
    fn log_name(&self, suite: &TestSuite, test: &TestCase) -> String {
        match self.driver.cpu() {
            Some(cpu) => format!("{}.{}.{}", cpu, suite.name, test.name),
            None => format!("{}.{}", suite.name, test.name),
        }
    }
}

fn compile_filter(what: &str, pattern: Option<&str>) -> Result<Regex, HarnessError> {
    let pattern = pattern.unwrap_or(".*");
    Regex::new(pattern)
        .map_err(|err| HarnessError::Config(format!("invalid {what} filter `{pattern}`: {err}")))
}

/// Whether `regex` matches at the start of `name`. A match further in does
/// not select the name.
fn matches_from_start(regex: &Regex, name: &str) -> bool {
    regex.find(name).is_some_and(|found| found.start() == 0)
}
