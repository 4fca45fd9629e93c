//! On-disk artifacts produced by a harness session.
//!
//! Every file a session writes (run logs, generated device trees, UART
//! captures, the final report) is claimed here first. Claiming twice is a
//! programming error and fails loudly rather than silently overwriting an
//! earlier run's output.

use std::collections::HashSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::error::HarnessError;

/// Names of the session-level log and report, fixed for result collectors
/// that look for them by name.
const SESSION_LOG_NAME: &str = "sponge_log";

/// Tracks the files created under one session's log directory.
#[derive(Debug)]
pub struct ArtifactStore {
    log_dir: PathBuf,
    created: HashSet<PathBuf>,
    session_log_path: PathBuf,
    report_xml_path: PathBuf,
}

impl ArtifactStore {
    /// Sets up `log_dir` and claims the session-level artifacts.
    ///
    /// The directory is created if missing. A path that exists but is not a
    /// directory is rejected.
    pub fn new(log_dir: impl Into<PathBuf>) -> Result<Self, HarnessError> {
        let log_dir = log_dir.into();
        if let Ok(meta) = fs::metadata(&log_dir) {
            if !meta.is_dir() {
                return Err(HarnessError::InvalidOutputPath(log_dir));
            }
        }
        fs::create_dir_all(&log_dir)?;
        println!("Logs saved under {}", log_dir.display());

        let mut store = Self {
            log_dir,
            created: HashSet::new(),
            session_log_path: PathBuf::new(),
            report_xml_path: PathBuf::new(),
        };
        store.session_log_path = store.create(SESSION_LOG_NAME, ".log")?;
        store.report_xml_path = store.create(SESSION_LOG_NAME, ".xml")?;
        Ok(store)
    }

    fn file_path(&self, name: &str, extension: &str) -> PathBuf {
        self.log_dir.join(format!("{name}{extension}"))
    }

    /// Claims a new artifact and creates it empty on disk.
    pub fn create(&mut self, name: &str, extension: &str) -> Result<PathBuf, HarnessError> {
        let path = self.file_path(name, extension);
        if !self.created.insert(path.clone()) {
            return Err(HarnessError::DuplicateArtifact(path));
        }
        File::create(&path)?;
        Ok(path)
    }

    /// Looks up a previously created artifact.
    pub fn resolve(&self, name: &str, extension: &str) -> Result<PathBuf, HarnessError> {
        let path = self.file_path(name, extension);
        if !self.created.contains(&path) {
            return Err(HarnessError::UnknownArtifact(path));
        }
        Ok(path)
    }

    /// Session-wide log every run's output is appended to.
    pub fn session_log_path(&self) -> &Path {
        &self.session_log_path
    }

    /// Where the final XML report is written.
    pub fn report_xml_path(&self) -> &Path {
        &self.report_xml_path
    }

    /// Directory all artifacts live under.
    pub fn dir(&self) -> &Path {
        &self.log_dir
    }
}
