//! Command-line interface of the harness.
//!
//! One invocation runs one image: resolve what to boot, pick the execution
//! backend, run the selected tests and report. Argument parsing uses clap
//! derive macros. Everything returns `CliResult<T>` instead of calling
//! `process::exit`; only the top-level `run()` handles errors and exits.

// Enforce explicit error handling - no panicking in production code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

use std::fmt;
use std::path::PathBuf;
use std::process;

use clap::{Parser, ValueEnum};

use crate::artifacts::ArtifactStore;
use crate::config::{DriverConfig, ToolPaths};
use crate::driver::serial::{ConsoleOperator, SerialPortConnector};
use crate::driver::{Driver, FvpDriver, QemuDriver, SerialDriver};
use crate::error::HarnessError;
use crate::report::TestCounts;
use crate::runner::TestRunner;

// ============================================================================
// CLI Error handling
// ============================================================================

/// Exit code for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(pub i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    pub const FAILURE: ExitCode = ExitCode(1);
    /// The filters selected nothing, which usually means a typo.
    pub const NO_TESTS_MATCHED: ExitCode = ExitCode(10);
}

/// Error type for CLI operations.
///
/// Contains a user-facing message and an exit code. The CLI entry point
/// catches these errors, prints the message, and exits with the code.
#[derive(Debug)]
pub struct CliError {
    /// User-facing error message (already formatted for display)
    pub message: String,
    /// Exit code to return to the shell
    pub exit_code: ExitCode,
}

impl CliError {
    /// Create a new CLI error with a message and exit code.
    pub fn new(message: impl Into<String>, exit_code: ExitCode) -> Self {
        Self {
            message: message.into(),
            exit_code,
        }
    }

    /// Create a failure error (exit code 1).
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(message, ExitCode::FAILURE)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

impl From<HarnessError> for CliError {
    fn from(err: HarnessError) -> Self {
        CliError::failure(format!("Error: {err}"))
    }
}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Clap CLI definition
// ============================================================================

/// Execution backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Emulate the target under QEMU.
    Qemu,
    /// Simulate the target on the Arm Fixed Virtual Platform model.
    Fvp,
    /// Drive a physical board over a serial console.
    Serial,
}

/// Run tests on an hftest image
#[derive(Parser, Debug)]
#[command(name = "hftest")]
#[command(version = VERSION)]
#[command(about = "Run tests on an hftest image", long_about = None)]
pub struct Cli {
    /// Name of the image to test, resolved to <out>/<image>.bin
    #[arg(value_name = "IMAGE")]
    pub image: String,

    /// Build output directory containing the image
    #[arg(long, value_name = "DIR")]
    pub out: PathBuf,

    /// Directory run logs and the report are written under
    #[arg(long, value_name = "DIR")]
    pub log: PathBuf,

    /// Build output directory containing initial ramdisks
    #[arg(long, value_name = "DIR")]
    pub out_initrd: Option<PathBuf>,

    /// Name of the initial ramdisk to boot with
    #[arg(long, value_name = "NAME", requires = "out_initrd")]
    pub initrd: Option<String>,

    /// Regular expression selecting the suites to run, matched at the
    /// start of the suite name
    #[arg(long, value_name = "REGEX")]
    pub suite: Option<String>,

    /// Regular expression selecting the tests to run, matched at the
    /// start of the test name
    #[arg(long, value_name = "REGEX")]
    pub test: Option<String>,

    /// Extra boot arguments prepended to each test's command line
    #[arg(long, value_name = "ARGS")]
    pub vm_args: Option<String>,

    /// Execution backend
    #[arg(long, value_enum, default_value = "qemu")]
    pub driver: Backend,

    /// CPU model to emulate (qemu backend only)
    #[arg(long, value_name = "MODEL")]
    pub cpu: Option<String>,

    /// Boot through the TF-A secure-firmware chain
    #[arg(long)]
    pub tfa: bool,

    /// Skip tests marked long-running
    #[arg(long)]
    pub skip_long_running_tests: bool,

    /// Give every run the extended deadline
    #[arg(long)]
    pub force_long_running: bool,

    /// Serial device the target console is attached to
    #[arg(long, value_name = "DEV", default_value = "/dev/ttyUSB0")]
    pub serial_dev: String,

    /// Baud rate of the serial console
    #[arg(long, value_name = "BAUD", default_value_t = 115_200)]
    pub serial_baudrate: u32,

    /// Do not wait for the operator to reset the device before the first run
    #[arg(long)]
    pub serial_no_init_wait: bool,
}

// ============================================================================
// CLI entry point
// ============================================================================

/// Main CLI entry point.
///
/// This is the only place where `process::exit` is called. Everything else
/// returns `CliResult` and errors are handled here.
pub fn run() {
    let cli = Cli::parse();

    match execute(cli) {
        Ok(exit_code) => {
            if exit_code.0 != 0 {
                process::exit(exit_code.0);
            }
        }
        Err(e) => {
            if !e.message.is_empty() {
                eprintln!("{}", e.message);
            }
            process::exit(e.exit_code.0);
        }
    }
}

/// Resolve the configuration, run the session and map the counts to an
/// exit code.
fn execute(cli: Cli) -> CliResult<ExitCode> {
    let image = cli.out.join(format!("{}.bin", cli.image));

    // Booting with a ramdisk changes what the image does, so the ramdisk
    // name becomes part of the reported image identity.
    let mut image_name = cli.image.clone();
    let initrd = match &cli.initrd {
        Some(name) => {
            let out_initrd = cli
                .out_initrd
                .as_ref()
                .ok_or_else(|| CliError::failure("Error: --initrd requires --out-initrd"))?;
            image_name = format!("{image_name}_{name}");
            Some(out_initrd.join("obj").join(name).join("initrd.img"))
        }
        None => None,
    };

    let artifacts = ArtifactStore::new(cli.log.join(&image_name))?;
    let report_path = artifacts.report_xml_path().to_path_buf();
    let config = DriverConfig::new(image, initrd, cli.vm_args, cli.cpu);
    let paths = ToolPaths::default();

    let driver: Box<dyn Driver> = match cli.driver {
        Backend::Qemu => Box::new(QemuDriver::new(config, artifacts, paths, cli.out, cli.tfa)),
        Backend::Fvp => Box::new(FvpDriver::new(config, artifacts, paths)?),
        Backend::Serial => Box::new(SerialDriver::new(
            config,
            artifacts,
            Box::new(SerialPortConnector::new(cli.serial_dev, cli.serial_baudrate)),
            Box::new(ConsoleOperator),
            !cli.serial_no_init_wait,
        )?),
    };

    let mut runner = TestRunner::new(
        driver,
        image_name,
        cli.suite.as_deref(),
        cli.test.as_deref(),
        cli.skip_long_running_tests,
        cli.force_long_running,
        report_path,
    )?;
    let counts = runner.run_all()?;

    let exit_code = exit_code_for(counts);
    if exit_code == ExitCode::NO_TESTS_MATCHED {
        println!("Error: no tests match");
    }
    Ok(exit_code)
}

/// Maps the final counts to the process exit code: selecting nothing is
/// reported differently from failing, so automation can tell a typo in a
/// filter from a broken image.
fn exit_code_for(counts: TestCounts) -> ExitCode {
    if counts.run == 0 {
        ExitCode::NO_TESTS_MATCHED
    } else if counts.failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_minimal() {
        let cli = Cli::try_parse_from(["hftest", "primary_only_test", "--out", "o", "--log", "l"]).unwrap();
        assert_eq!(cli.image, "primary_only_test");
        assert_eq!(cli.driver, Backend::Qemu);
        assert_eq!(cli.serial_dev, "/dev/ttyUSB0");
        assert_eq!(cli.serial_baudrate, 115_200);
        assert!(!cli.tfa);
        assert!(!cli.skip_long_running_tests);
    }

    #[test]
    fn test_cli_requires_out_and_log() {
        assert!(Cli::try_parse_from(["hftest", "img"]).is_err());
        assert!(Cli::try_parse_from(["hftest", "img", "--out", "o"]).is_err());
    }

    #[test]
    fn test_cli_parse_driver_choices() {
        let cli = Cli::try_parse_from(["hftest", "img", "--out", "o", "--log", "l", "--driver", "fvp"])
            .unwrap();
        assert_eq!(cli.driver, Backend::Fvp);
        let cli =
            Cli::try_parse_from(["hftest", "img", "--out", "o", "--log", "l", "--driver", "serial"])
                .unwrap();
        assert_eq!(cli.driver, Backend::Serial);
        assert!(
            Cli::try_parse_from(["hftest", "img", "--out", "o", "--log", "l", "--driver", "tape"])
                .is_err()
        );
    }

    #[test]
    fn test_cli_parse_filters_and_args() {
        let cli = Cli::try_parse_from([
            "hftest",
            "img",
            "--out",
            "o",
            "--log",
            "l",
            "--suite",
            "memory",
            "--test",
            "alloc",
            "--vm-args",
            "earlycon",
        ])
        .unwrap();
        assert_eq!(cli.suite.as_deref(), Some("memory"));
        assert_eq!(cli.test.as_deref(), Some("alloc"));
        assert_eq!(cli.vm_args.as_deref(), Some("earlycon"));
    }

    #[test]
    fn test_cli_initrd_requires_out_initrd() {
        assert!(
            Cli::try_parse_from(["hftest", "img", "--out", "o", "--log", "l", "--initrd", "r"])
                .is_err()
        );
        let cli = Cli::try_parse_from([
            "hftest",
            "img",
            "--out",
            "o",
            "--log",
            "l",
            "--out-initrd",
            "oi",
            "--initrd",
            "r",
        ])
        .unwrap();
        assert_eq!(cli.initrd.as_deref(), Some("r"));
    }

    #[test]
    fn test_exit_code_reflects_counts() {
        let passed = TestCounts { run: 3, failed: 0, skipped: 1 };
        assert_eq!(exit_code_for(passed), ExitCode::SUCCESS);
        let failed = TestCounts { run: 3, failed: 1, skipped: 0 };
        assert_eq!(exit_code_for(failed), ExitCode::FAILURE);
        let nothing = TestCounts { run: 0, failed: 0, skipped: 0 };
        assert_eq!(exit_code_for(nothing), ExitCode::NO_TESTS_MATCHED);
        // Skip-only sessions selected tests but ran none of them.
        let only_skips = TestCounts { run: 0, failed: 0, skipped: 2 };
        assert_eq!(exit_code_for(only_skips), ExitCode::NO_TESTS_MATCHED);
    }

    #[test]
    fn test_cli_parse_long_running_flags() {
        let cli = Cli::try_parse_from([
            "hftest",
            "img",
            "--out",
            "o",
            "--log",
            "l",
            "--skip-long-running-tests",
        ])
        .unwrap();
        assert!(cli.skip_long_running_tests);
        let cli =
            Cli::try_parse_from(["hftest", "img", "--out", "o", "--log", "l", "--force-long-running"])
                .unwrap();
        assert!(cli.force_long_running);
    }
}
