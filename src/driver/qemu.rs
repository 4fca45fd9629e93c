//! QEMU system-emulation backend.

use std::ffi::OsString;
use std::path::{self, PathBuf};

use crate::artifacts::ArtifactStore;
use crate::config::{DriverConfig, ToolPaths};
use crate::driver::{self, Driver, DriverBase};
use crate::error::HarnessError;

/// Machine model matching what the images are built for.
const MACHINE: &str = "virt,virtualization=on,gic-version=3";

/// Boots the image under `qemu-system-aarch64`.
pub struct QemuDriver {
    base: DriverBase,
    paths: ToolPaths,
    /// Working directory for the emulator, normally the build output
    /// directory so relative firmware paths resolve.
    working_dir: PathBuf,
    /// Boot through the TF-A secure-firmware chain instead of jumping
    /// straight into the image.
    tfa: bool,
}

impl QemuDriver {
    pub fn new(
        config: DriverConfig,
        artifacts: ArtifactStore,
        paths: ToolPaths,
        working_dir: PathBuf,
        tfa: bool,
    ) -> Self {
        Self {
            base: DriverBase::new(config, artifacts),
            paths,
            working_dir,
            tfa,
        }
    }

    /// Full command line for one run.
    ///
    /// Paths are made absolute because the emulator runs with its own
    /// working directory.
    fn command_line(&self, test_args: &str, is_long_running: bool) -> Result<Vec<OsString>, HarnessError> {
        let time_limit = if is_long_running { "120s" } else { "10s" };
        let config = self.base.config();
        let cpu = config.cpu.as_deref().unwrap_or("max");

        let mut args: Vec<OsString> = driver::deadline(time_limit).into();
        args.extend([
            path::absolute(&self.paths.qemu)?.into(),
            "-machine".into(),
            MACHINE.into(),
            "-cpu".into(),
            cpu.into(),
            "-smp".into(),
            "4".into(),
            "-m".into(),
            "1G".into(),
            "-nographic".into(),
            "-nodefaults".into(),
            "-serial".into(),
            "stdio".into(),
            "-d".into(),
            "unimp".into(),
            "-kernel".into(),
            path::absolute(&config.image)?.into(),
        ]);
        if self.tfa {
            args.extend([
                "-bios".into(),
                path::absolute(&self.paths.qemu_bl1)?.into(),
                "-machine".into(),
                "secure=on".into(),
                "-semihosting-config".into(),
                "enable,target=native".into(),
            ]);
        }
        if let Some(initrd) = &config.initrd {
            args.push("-initrd".into());
            args.push(path::absolute(initrd)?.into());
        }
        let boot_args = driver::join_args(&config.vm_args, test_args);
        if !boot_args.is_empty() {
            args.push("-append".into());
            args.push(boot_args.into());
        }
        Ok(args)
    }
}

impl Driver for QemuDriver {
    fn run(&mut self, run_name: &str, test_args: &str, is_long_running: bool) -> Result<String, HarnessError> {
        let mut state = self.base.start_run(run_name)?;
        let command = self.command_line(test_args, is_long_running)?;
        // Single step; a failure is already recorded on the run state.
        let _ = self.base.exec_logged(&mut state, &command, Some(&self.working_dir))?;
        self.base.finish_run(&state)
    }

    fn finish(&mut self) -> Result<(), HarnessError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "QemuDriver"
    }

    fn cpu(&self) -> Option<&str> {
        self.base.config().cpu.as_deref()
    }

    fn run_log(&self, run_name: &str) -> Result<PathBuf, HarnessError> {
        self.base.run_log(run_name)
    }
}
