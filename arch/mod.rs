//! Architecture support
//!
//! The core only touches physical CPU state through [`CpuOps`]. On ARMv7
//! targets with the virtualization extensions the backend is
//! [`arm32::Armv7Cpu`] on bare metal; hosted builds get [`sim::SimCpu`],
//! which keeps the "live" registers in memory. [`Platform`] names the one
//! selected for the build target.

pub mod arm32;
pub mod sim;

use self::arm32::{ArchRegs, BankedRegs, CopRegs};

cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "arm", target_os = "none"))] {
        /// CPU backend for the build target
        pub type Platform = arm32::Armv7Cpu;
    } else {
        /// CPU backend for the build target
        pub type Platform = sim::SimCpu;
    }
}

/// Interrupt mask state returned by [`CpuOps::irq_disable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrqFlags(pub u32);

/// Raw access to the physical CPU state a guest switch has to move
///
/// Save and restore calls are only legal between `irq_disable` and the
/// matching `irq_restore`.
pub trait CpuOps {
    /// Mask IRQs and return the previous mask state
    fn irq_disable(&mut self) -> IrqFlags;

    /// Restore the mask state returned by `irq_disable`
    fn irq_restore(&mut self, flags: IrqFlags);

    /// Copy the live banked registers into `banked`
    fn save_banked(&mut self, banked: &mut BankedRegs);

    /// Load `banked` into the live banked registers
    fn restore_banked(&mut self, banked: &BankedRegs);

    /// Copy the live CP15 state into `cop`
    fn save_cop(&mut self, cop: &mut CopRegs);

    /// Load `cop` into the live CP15 state
    fn restore_cop(&mut self, cop: &CopRegs);

    /// Leave hyp mode and start executing the guest described by `regs`
    fn enter_guest(&mut self, regs: &ArchRegs) -> !;
}

/// Stop this core for good
pub fn halt() -> ! {
    loop {
        #[cfg(target_arch = "arm")]
        unsafe {
            core::arch::asm!("wfi", options(nomem, nostack, preserves_flags));
        }

        #[cfg(not(target_arch = "arm"))]
        core::hint::spin_loop();
    }
}
