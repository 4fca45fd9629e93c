//! Configuration shared by every execution backend.

use std::path::PathBuf;

/// What to boot and how, resolved once at startup.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Test image the target boots.
    pub image: PathBuf,
    /// Initial ramdisk to load alongside the image, if any.
    pub initrd: Option<PathBuf>,
    /// Extra boot arguments prepended to the per-test command line.
    pub vm_args: String,
    /// CPU model override, honoured by backends that emulate a CPU.
    pub cpu: Option<String>,
}

impl DriverConfig {
    pub fn new(image: PathBuf, initrd: Option<PathBuf>, vm_args: Option<String>, cpu: Option<String>) -> Self {
        Self {
            image,
            initrd,
            vm_args: vm_args.unwrap_or_default(),
            cpu,
        }
    }
}

/// Locations of the emulator binaries and firmware prebuilts.
///
/// The defaults mirror the checked-in prebuilts of the image tree and are
/// relative to the tree root, which is where the harness is normally run
/// from. Tests inject their own paths.
#[derive(Debug, Clone)]
pub struct ToolPaths {
    /// QEMU system emulator for AArch64.
    pub qemu: PathBuf,
    /// TF-A BL1 image used when booting QEMU through the secure-firmware
    /// chain.
    pub qemu_bl1: PathBuf,
    /// Arm Fixed Virtual Platform model binary.
    pub fvp: PathBuf,
    /// Base device tree source the FVP backend extends per run.
    pub fvp_base_dts: PathBuf,
    /// TF-A BL31 image the FVP loads at the reset vector.
    pub fvp_bl31: PathBuf,
    /// Device tree compiler.
    pub dtc: PathBuf,
    /// Device tree overlay tool shipped next to dtc.
    pub fdtoverlay: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            qemu: PathBuf::from("prebuilts/linux-x64/qemu/qemu-system-aarch64"),
            qemu_bl1: PathBuf::from("prebuilts/linux-aarch64/trusted-firmware-a-trusty/qemu/bl1.bin"),
            fvp: PathBuf::from(
                "../fvp/Base_RevC_AEMv8A_pkg/models/Linux64_GCC-6.4/FVP_Base_RevC-2xAEMv8A",
            ),
            fvp_base_dts: PathBuf::from(
                "prebuilts/linux-aarch64/trusted-firmware-a-trusty/fvp/fvp-base-gicv3-psci-1t.dts",
            ),
            fvp_bl31: PathBuf::from("prebuilts/linux-aarch64/trusted-firmware-a-trusty/fvp/bl31.bin"),
            dtc: PathBuf::from("prebuilts/linux-x64/dtc/dtc"),
            fdtoverlay: PathBuf::from("prebuilts/linux-x64/dtc/fdtoverlay"),
        }
    }
}
