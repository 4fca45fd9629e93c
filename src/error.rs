//! Error types shared across the harness.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a harness run.
///
/// A failing test is not an error. Drivers absorb non-zero exit statuses and
/// expired deadlines into the run log, and the runner classifies the test
/// from the log content. Only faults in the harness itself (bad
/// configuration, unusable output paths, I/O trouble) surface as
/// [`HarnessError`].
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Rejected configuration, reported before any image is booted.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The discovery payload could not be parsed. Without the catalog no
    /// test identities are known, so the run cannot continue.
    #[error("test catalog is not valid JSON: {0}")]
    CatalogJson(#[from] serde_json::Error),

    /// An artifact name was claimed twice within one session.
    #[error("artifact already created: {}", .0.display())]
    DuplicateArtifact(PathBuf),

    /// An artifact was looked up before anything created it.
    #[error("artifact was never created: {}", .0.display())]
    UnknownArtifact(PathBuf),

    /// The log directory path exists but is not a directory.
    #[error("output path exists and is not a directory: {}", .0.display())]
    InvalidOutputPath(PathBuf),

    /// I/O fault in the harness itself: log files, spawning subprocesses,
    /// reading prebuilt blobs.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The serial device could not be opened or configured.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The result report could not be serialized.
    #[error("failed to write report: {0}")]
    Report(String),
}
