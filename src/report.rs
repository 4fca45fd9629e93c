//! Result aggregation and the XML report.
//!
//! The report mirrors the shape result collectors expect: a `testsuites`
//! root with per-suite `testsuite` children carrying properties and
//! `testcase` leaves. Counts at every level follow the same rule: `tests`
//! is everything that was not filtered out, split into run and skipped.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::ops::{Add, AddAssign};
use std::path::Path;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::error::HarnessError;

/// How many tests ran, failed and were skipped.
///
/// Filtered-out tests are not counted anywhere. Skipped tests were
/// selected but not run, so they appear in `skipped` and never in `run`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TestCounts {
    pub run: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl Add for TestCounts {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            run: self.run + rhs.run,
            failed: self.failed + rhs.failed,
            skipped: self.skipped + rhs.skipped,
        }
    }
}

impl AddAssign for TestCounts {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// Reported state of one selected test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseStatus {
    Run,
    NotRun,
}

impl CaseStatus {
    fn as_str(self) -> &'static str {
        match self {
            CaseStatus::Run => "run",
            CaseStatus::NotRun => "notrun",
        }
    }
}

/// A failed test's message and the log lines backing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    pub message: String,
    pub details: String,
}

/// One selected test in the report.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseReport {
    pub name: String,
    pub classname: String,
    pub status: CaseStatus,
    /// Wall-clock duration of the run, in seconds. Absent for skips.
    pub time: Option<f64>,
    /// Why the test was skipped, when it was.
    pub skipped: Option<String>,
    /// Raw console output of the run.
    pub system_out: Option<String>,
    pub failure: Option<FailureReport>,
}

impl CaseReport {
    pub fn new(name: impl Into<String>, classname: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            classname: classname.into(),
            status: CaseStatus::Run,
            time: None,
            skipped: None,
            system_out: None,
            failure: None,
        }
    }
}

/// One suite's results.
#[derive(Debug, Clone, PartialEq)]
pub struct SuiteReport {
    pub name: String,
    /// Environment the suite ran under, recorded as property elements.
    pub properties: Vec<(String, String)>,
    pub counts: TestCounts,
    pub time: f64,
    pub tests: Vec<CaseReport>,
}

impl SuiteReport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
            counts: TestCounts::default(),
            time: 0.0,
            tests: Vec::new(),
        }
    }
}

/// The whole session's results.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    /// Image name the session ran against.
    pub name: String,
    /// Session start, ISO-8601 to the second.
    pub timestamp: String,
    pub counts: TestCounts,
    pub time: f64,
    pub suites: Vec<SuiteReport>,
}

impl Report {
    pub fn new(name: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timestamp: timestamp.into(),
            counts: TestCounts::default(),
            time: 0.0,
            suites: Vec::new(),
        }
    }
}

/// Serializes the report to `path`.
pub fn write_xml(report: &Report, path: &Path) -> Result<(), HarnessError> {
    let file = File::create(path)?;
    let mut writer = Writer::new(BufWriter::new(file));
    emit(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

    let mut root = BytesStart::new("testsuites");
    root.push_attribute(("name", report.name.as_str()));
    root.push_attribute(("timestamp", report.timestamp.as_str()));
    push_count_attributes(&mut root, report.counts, report.time);
    emit(&mut writer, Event::Start(root))?;
    for suite in &report.suites {
        write_suite(&mut writer, suite)?;
    }
    emit(&mut writer, Event::End(BytesEnd::new("testsuites")))?;
    writer.into_inner().flush()?;
    Ok(())
}

fn write_suite<W: Write>(writer: &mut Writer<W>, suite: &SuiteReport) -> Result<(), HarnessError> {
    let mut element = BytesStart::new("testsuite");
    element.push_attribute(("name", suite.name.as_str()));
    push_count_attributes(&mut element, suite.counts, suite.time);
    emit(writer, Event::Start(element))?;

    emit(writer, Event::Start(BytesStart::new("properties")))?;
    for (name, value) in &suite.properties {
        let mut property = BytesStart::new("property");
        property.push_attribute(("name", name.as_str()));
        property.push_attribute(("value", value.as_str()));
        emit(writer, Event::Empty(property))?;
    }
    emit(writer, Event::End(BytesEnd::new("properties")))?;

    for case in &suite.tests {
        write_case(writer, case)?;
    }
    emit(writer, Event::End(BytesEnd::new("testsuite")))
}

fn write_case<W: Write>(writer: &mut Writer<W>, case: &CaseReport) -> Result<(), HarnessError> {
    let mut element = BytesStart::new("testcase");
    element.push_attribute(("name", case.name.as_str()));
    element.push_attribute(("classname", case.classname.as_str()));
    element.push_attribute(("status", case.status.as_str()));
    if let Some(time) = case.time {
        element.push_attribute(("time", time.to_string().as_str()));
    }
    emit(writer, Event::Start(element))?;

    if let Some(reason) = &case.skipped {
        let mut skipped = BytesStart::new("skipped");
        skipped.push_attribute(("message", reason.as_str()));
        emit(writer, Event::Empty(skipped))?;
    }
    if let Some(output) = &case.system_out {
        emit(writer, Event::Start(BytesStart::new("system-out")))?;
        emit(writer, Event::Text(BytesText::new(output)))?;
        emit(writer, Event::End(BytesEnd::new("system-out")))?;
    }
    if let Some(failure) = &case.failure {
        let mut element = BytesStart::new("failure");
        element.push_attribute(("message", failure.message.as_str()));
        emit(writer, Event::Start(element))?;
        emit(writer, Event::Text(BytesText::new(&failure.details)))?;
        emit(writer, Event::End(BytesEnd::new("failure")))?;
    }
    emit(writer, Event::End(BytesEnd::new("testcase")))
}

fn push_count_attributes(element: &mut BytesStart, counts: TestCounts, time: f64) {
    element.push_attribute(("tests", (counts.run + counts.skipped).to_string().as_str()));
    element.push_attribute(("failures", counts.failed.to_string().as_str()));
    element.push_attribute(("skipped", counts.skipped.to_string().as_str()));
    element.push_attribute(("time", time.to_string().as_str()));
}

fn emit<W: Write>(writer: &mut Writer<W>, event: Event) -> Result<(), HarnessError> {
    writer
        .write_event(event)
        .map_err(|err| HarnessError::Report(err.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn counts_add_fieldwise() {
        let mut counts = TestCounts { run: 1, failed: 0, skipped: 0 };
        counts += TestCounts { run: 2, failed: 1, skipped: 3 };
        assert_eq!(counts, TestCounts { run: 3, failed: 1, skipped: 3 });
    }

    fn read_back(report: &Report) -> String {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.xml");
        write_xml(report, &path).unwrap();
        std::fs::read_to_string(&path).unwrap()
    }

    #[test]
    fn empty_report_has_zeroed_root() {
        let report = Report::new("test_image", "2024-01-01T00:00:00");
        let xml = read_back(&report);
        assert_eq!(
            xml,
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
             <testsuites name=\"test_image\" timestamp=\"2024-01-01T00:00:00\" \
             tests=\"0\" failures=\"0\" skipped=\"0\" time=\"0\"></testsuites>"
        );
    }

    #[test]
    fn passed_case_carries_output_and_time() {
        let mut report = Report::new("img", "2024-01-01T00:00:00");
        report.counts = TestCounts { run: 1, failed: 0, skipped: 0 };
        report.time = 0.5;
        let mut suite = SuiteReport::new("s1");
        suite.properties.push(("driver".to_string(), "QemuDriver".to_string()));
        suite.counts = report.counts;
        suite.time = 0.25;
        let mut case = CaseReport::new("t1", "s1");
        case.time = Some(0.25);
        case.system_out = Some("[hftest] FINISHED\r\n".to_string());
        suite.tests.push(case);
        report.suites.push(suite);

        let xml = read_back(&report);
        assert!(xml.contains(
            "<testsuite name=\"s1\" tests=\"1\" failures=\"0\" skipped=\"0\" time=\"0.25\">"
        ));
        assert!(xml.contains("<property name=\"driver\" value=\"QemuDriver\"/>"));
        assert!(xml.contains("<testcase name=\"t1\" classname=\"s1\" status=\"run\" time=\"0.25\">"));
        assert!(xml.contains("<system-out>[hftest] FINISHED\r\n</system-out>"));
    }

    #[test]
    fn skipped_case_has_reason_and_no_time() {
        let mut suite = SuiteReport::new("s1");
        suite.counts = TestCounts { run: 0, failed: 0, skipped: 1 };
        let mut case = CaseReport::new("slow", "s1");
        case.status = CaseStatus::NotRun;
        case.skipped = Some("Long running".to_string());
        suite.tests.push(case);
        let mut report = Report::new("img", "2024-01-01T00:00:00");
        report.counts = suite.counts;
        report.suites.push(suite);

        let xml = read_back(&report);
        assert!(xml.contains("<testcase name=\"slow\" classname=\"s1\" status=\"notrun\">"));
        assert!(xml.contains("<skipped message=\"Long running\"/>"));
        assert!(xml.contains("tests=\"1\" failures=\"0\" skipped=\"1\""));
    }

    #[test]
    fn failure_message_is_escaped() {
        let mut suite = SuiteReport::new("s1");
        suite.counts = TestCounts { run: 1, failed: 1, skipped: 0 };
        let mut case = CaseReport::new("t1", "s1");
        case.time = Some(0.1);
        case.system_out = Some("raw".to_string());
        case.failure = Some(FailureReport {
            message: "a < b & c".to_string(),
            details: "Failure:\na < b & c".to_string(),
        });
        suite.tests.push(case);
        let mut report = Report::new("img", "2024-01-01T00:00:00");
        report.counts = suite.counts;
        report.suites.push(suite);

        let xml = read_back(&report);
        assert!(xml.contains("<failure message=\"a &lt; b &amp; c\">"));
        assert!(xml.contains("Failure:\na &lt; b &amp; c</failure>"));
        // Output precedes the failure element, matching collector layout.
        let out_at = xml.find("<system-out>").unwrap();
        let failure_at = xml.find("<failure").unwrap();
        assert!(out_at < failure_at);
    }
}
