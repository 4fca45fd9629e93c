//! Execution backends.
//!
//! A driver takes one test invocation, boots the image with the right
//! command line, captures everything the target prints into a per-run log
//! file and hands the log content back. The runner never talks to QEMU, the
//! FVP or a serial line directly; it only sees [`Driver`].

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::artifacts::ArtifactStore;
use crate::config::DriverConfig;
use crate::error::HarnessError;
use crate::protocol;

pub mod fvp;
pub mod qemu;
pub mod serial;

pub use fvp::FvpDriver;
pub use qemu::QemuDriver;
pub use serial::SerialDriver;

/// Exit status coreutils `timeout` reports when the deadline expires.
pub const TIMEOUT_STATUS: i32 = 124;

/// One execution backend.
///
/// `run` absorbs target-side failures: a non-zero exit status or an expired
/// deadline is recorded in the returned log, not raised. Only harness
/// faults (unwritable logs, unspawnable subprocesses) come back as errors.
pub trait Driver {
    /// Boots the image once, passing `test_args` as its command line, and
    /// returns the captured log content.
    fn run(&mut self, run_name: &str, test_args: &str, is_long_running: bool) -> Result<String, HarnessError>;

    /// Cleans up once the whole session is over.
    fn finish(&mut self) -> Result<(), HarnessError>;

    /// Name recorded in the report for this backend.
    fn name(&self) -> &'static str;

    /// CPU model override, when one is configured.
    fn cpu(&self) -> Option<&str>;

    /// Path of a given run's log file.
    fn run_log(&self, run_name: &str) -> Result<PathBuf, HarnessError>;
}

/// Whether a single step of a run sequence completed.
///
/// A failed step already updated the run state; callers stop the sequence
/// and let the recorded status speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum StepStatus {
    Completed,
    Failed,
}

/// Log file and accumulated status of one run.
#[derive(Debug)]
pub struct RunState {
    log_path: PathBuf,
    status: i32,
}

impl RunState {
    pub(crate) fn new(log_path: PathBuf) -> Self {
        Self { log_path, status: 0 }
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Exit status of the first failed step, 0 while everything succeeded.
    pub fn status(&self) -> i32 {
        self.status
    }

    pub fn set_status(&mut self, status: i32) {
        self.status = status;
    }
}

/// Plumbing shared by every backend: log bookkeeping, subprocess execution
/// and run finalization.
#[derive(Debug)]
pub(crate) struct DriverBase {
    config: DriverConfig,
    artifacts: ArtifactStore,
}

impl DriverBase {
    pub(crate) fn new(config: DriverConfig, artifacts: ArtifactStore) -> Self {
        Self { config, artifacts }
    }

    pub(crate) fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub(crate) fn artifacts_mut(&mut self) -> &mut ArtifactStore {
        &mut self.artifacts
    }

    pub(crate) fn run_log(&self, run_name: &str) -> Result<PathBuf, HarnessError> {
        self.artifacts.resolve(run_name, ".log")
    }

    /// Claims the run's log file and starts with a clean status.
    pub(crate) fn start_run(&mut self, run_name: &str) -> Result<RunState, HarnessError> {
        Ok(RunState::new(self.artifacts.create(run_name, ".log")?))
    }

    /// Runs one subprocess with stdout and stderr appended to the run log.
    ///
    /// The executed command line itself is logged first. A non-zero exit
    /// records the status on `state` and reports [`StepStatus::Failed`];
    /// failing to spawn at all is a harness error.
    pub(crate) fn exec_logged(
        &self,
        state: &mut RunState,
        command: &[OsString],
        cwd: Option<&Path>,
    ) -> Result<StepStatus, HarnessError> {
        debug_assert_eq!(state.status(), 0, "step after a failed step");
        let (program, args) = match command.split_first() {
            Some(split) => split,
            None => return Err(HarnessError::Config("empty command line".to_string())),
        };

        let mut log = OpenOptions::new().append(true).open(state.log_path())?;
        let cmdline = command
            .iter()
            .map(|arg| arg.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");
        write!(log, "$ {cmdline}\r\n")?;
        log.flush()?;
        tracing::debug!(%cmdline, "exec");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdout(Stdio::from(log.try_clone()?))
            .stderr(Stdio::from(log.try_clone()?));
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        let status = cmd.status()?;
        if status.success() {
            Ok(StepStatus::Completed)
        } else {
            // A process killed by a signal has no exit code.
            state.set_status(status.code().unwrap_or(-1));
            Ok(StepStatus::Failed)
        }
    }

    /// Finalizes a run: appends a synthetic failure line for abnormal exits,
    /// folds the run log into the session log and returns its content.
    pub(crate) fn finish_run(&self, state: &RunState) -> Result<String, HarnessError> {
        {
            let mut log = OpenOptions::new().append(true).open(state.log_path())?;
            if state.status() == TIMEOUT_STATUS {
                write!(log, "\r\n{}{} timed out\r\n", protocol::LOG_PREFIX, protocol::FAILURE_PREFIX)?;
            } else if state.status() != 0 {
                write!(
                    log,
                    "\r\n{}{} process return code {}\r\n",
                    protocol::LOG_PREFIX,
                    protocol::FAILURE_PREFIX,
                    state.status()
                )?;
            }
        }

        let content = String::from_utf8_lossy(&fs::read(state.log_path())?).into_owned();
        let mut session = OpenOptions::new().append(true).open(self.artifacts.session_log_path())?;
        write!(session, "{content}\r\n\r\n")?;
        Ok(content)
    }
}

/// Joins the non-empty argument groups with single spaces.
pub(crate) fn join_args(vm_args: &str, test_args: &str) -> String {
    [vm_args, test_args]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Deadline prefix for a run: the target is killed externally once the
/// limit expires, so a wedged image cannot hang the session.
pub(crate) fn deadline(limit: &str) -> [OsString; 3] {
    ["timeout".into(), "--foreground".into(), limit.into()]
}
