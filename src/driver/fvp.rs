//! Arm Fixed Virtual Platform backend.
//!
//! Each run generates a device tree carrying the boot arguments, compiles
//! it and boots the model with image, tree and ramdisk loaded at fixed
//! addresses. The target's console arrives on UART0, captured to a file the
//! model writes and folded into the run log afterwards.

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::artifacts::ArtifactStore;
use crate::config::{DriverConfig, ToolPaths};
use crate::driver::{self, Driver, DriverBase, StepStatus};
use crate::dtc::DeviceTreeCompiler;
use crate::error::HarnessError;

/// Load addresses, matching the model's memory map. Kept as the literal
/// strings the model is given.
const RESET_VECTOR: &str = "0x04020000";
const KERNEL_ADDRESS: &str = "0x80000000";
const DTB_ADDRESS: &str = "0x82000000";

/// Where the ramdisk is loaded, and the end address assumed when no
/// ramdisk is given.
const INITRD_START: u64 = 0x8400_0000;
const DEFAULT_INITRD_END: u64 = 0x8500_0000;

/// Boots the image on the FVP Base RevC model.
#[derive(Debug)]
pub struct FvpDriver {
    base: DriverBase,
    paths: ToolPaths,
    dtc: DeviceTreeCompiler,
}

impl FvpDriver {
    /// The model has a fixed CPU complement, so a CPU override is rejected
    /// up front.
    pub fn new(config: DriverConfig, artifacts: ArtifactStore, paths: ToolPaths) -> Result<Self, HarnessError> {
        if config.cpu.is_some() {
            return Err(HarnessError::Config(
                "the fvp driver does not support a CPU model override".to_string(),
            ));
        }
        let dtc = DeviceTreeCompiler::new(paths.dtc.clone(), paths.fdtoverlay.clone());
        Ok(Self {
            base: DriverBase::new(config, artifacts),
            paths,
            dtc,
        })
    }

    /// Writes the run's device tree source: the prebuilt base tree plus a
    /// chosen node carrying the boot arguments and ramdisk window.
    fn write_dts(
        &self,
        dts_path: &Path,
        test_args: &str,
        initrd_start: u64,
        initrd_end: u64,
    ) -> Result<(), HarnessError> {
        let base_dts = fs::read_to_string(&self.paths.fvp_base_dts)?;
        let boot_args = driver::join_args(&self.base.config().vm_args, test_args);
        let chosen = format!(
            r#"
/ {{
    chosen {{
        bootargs = "{boot_args}";
        stdout-path = "serial0:115200n8";
        linux,initrd-start = <{initrd_start}>;
        linux,initrd-end = <{initrd_end}>;
    }};
}};
"#
        );
        fs::write(dts_path, base_dts + &chosen)?;
        Ok(())
    }

    /// Full model command line for one run.
    fn command_line(
        &self,
        is_long_running: bool,
        uart0_log: &Path,
        uart1_log: &Path,
        dtb_path: &Path,
    ) -> Vec<OsString> {
        let time_limit = if is_long_running { "80s" } else { "40s" };
        let mut args: Vec<OsString> = driver::deadline(time_limit).into();
        args.push(self.paths.fvp.clone().into());

        let fixed = [
            "pctl.startup=0.0.0.0",
            "bp.secure_memory=0",
            "cluster0.NUM_CORES=4",
            "cluster1.NUM_CORES=4",
            "cache_state_modelled=0",
            "bp.vis.disable_visualisation=true",
            "bp.vis.rate_limit-enable=false",
            "bp.terminal_0.start_telnet=false",
            "bp.terminal_1.start_telnet=false",
            "bp.terminal_2.start_telnet=false",
            "bp.terminal_3.start_telnet=false",
            "bp.pl011_uart0.untimed_fifos=1",
            "bp.pl011_uart0.unbuffered_output=1",
        ];
        for option in fixed {
            args.push("-C".into());
            args.push(option.into());
        }
        args.push("-C".into());
        args.push(path_option("bp.pl011_uart0.out_file=", uart0_log));
        args.push("-C".into());
        args.push(path_option("bp.pl011_uart1.out_file=", uart1_log));

        for cluster in 0..2 {
            for core in 0..4 {
                args.push("-C".into());
                args.push(format!("cluster{cluster}.cpu{core}.RVBAR={RESET_VECTOR}").into());
            }
        }

        args.push("--data".into());
        args.push(data_load(&self.paths.fvp_bl31, RESET_VECTOR));
        args.push("--data".into());
        args.push(data_load(dtb_path, DTB_ADDRESS));
        args.push("--data".into());
        args.push(data_load(&self.base.config().image, KERNEL_ADDRESS));

        args.push("-C".into());
        args.push("bp.ve_sysregs.mmbSiteDefault=0".into());
        args.push("-C".into());
        args.push("bp.ve_sysregs.exit_on_shutdown=1".into());

        if let Some(initrd) = &self.base.config().initrd {
            args.push("--data".into());
            args.push(data_load(initrd, &format!("{INITRD_START:#x}")));
        }
        args
    }
}

/// `name=` model option carrying a path.
fn path_option(prefix: &str, path: &Path) -> OsString {
    let mut option = OsString::from(prefix);
    option.push(path);
    option
}

/// `--data` payload loading `path` at `address` from the boot core's view.
fn data_load(path: &Path, address: &str) -> OsString {
    let mut payload = OsString::from("cluster0.cpu0=");
    payload.push(path);
    payload.push("@");
    payload.push(address);
    payload
}

impl Driver for FvpDriver {
    fn run(&mut self, run_name: &str, test_args: &str, is_long_running: bool) -> Result<String, HarnessError> {
        let mut state = self.base.start_run(run_name)?;
        let dts_path = self.base.artifacts_mut().create(run_name, ".dts")?;
        let dtb_path = self.base.artifacts_mut().create(run_name, ".dtb")?;
        let uart0_log = self.base.artifacts_mut().create(run_name, ".uart0.log")?;
        let uart1_log = self.base.artifacts_mut().create(run_name, ".uart1.log")?;

        let initrd_end = match &self.base.config().initrd {
            Some(initrd) => INITRD_START + fs::metadata(initrd)?.len(),
            None => DEFAULT_INITRD_END,
        };

        self.write_dts(&dts_path, test_args, INITRD_START, initrd_end)?;
        let compile = self.dtc.compile_args(&dts_path, &dtb_path);
        if self.base.exec_logged(&mut state, &compile, None)? == StepStatus::Completed {
            let boot = self.command_line(is_long_running, &uart0_log, &uart1_log, &dtb_path);
            let _ = self.base.exec_logged(&mut state, &boot, None)?;
        }

        // The target's console went to the UART0 capture; fold it into the
        // run log before classification.
        let uart0 = fs::read(&uart0_log)?;
        let mut log = OpenOptions::new().append(true).open(state.log_path())?;
        log.write_all(&uart0)?;
        drop(log);

        self.base.finish_run(&state)
    }

    fn finish(&mut self) -> Result<(), HarnessError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "FvpDriver"
    }

    fn cpu(&self) -> Option<&str> {
        self.base.config().cpu.as_deref()
    }

    fn run_log(&self, run_name: &str) -> Result<PathBuf, HarnessError> {
        self.base.run_log(run_name)
    }
}
