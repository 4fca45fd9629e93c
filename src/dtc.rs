//! Thin wrapper around the device tree compiler and overlay tool.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Builds command lines for the `dtc` and `fdtoverlay` binaries.
#[derive(Debug, Clone)]
pub struct DeviceTreeCompiler {
    dtc: PathBuf,
    fdtoverlay: PathBuf,
}

impl DeviceTreeCompiler {
    pub fn new(dtc: PathBuf, fdtoverlay: PathBuf) -> Self {
        Self { dtc, fdtoverlay }
    }

    /// Command compiling a source tree into a binary blob.
    pub fn compile_args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        vec![
            self.dtc.clone().into(),
            "-I".into(),
            "dts".into(),
            "-O".into(),
            "dtb".into(),
            "--out-version".into(),
            "17".into(),
            "-o".into(),
            output.into(),
            input.into(),
        ]
    }

    /// Command applying overlay blobs on top of a base blob.
    pub fn overlay_args(&self, output: &Path, base: &Path, overlays: &[PathBuf]) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            self.fdtoverlay.clone().into(),
            "-i".into(),
            base.into(),
            "-o".into(),
            output.into(),
        ];
        args.extend(overlays.iter().map(|overlay| overlay.clone().into()));
        args
    }
}
