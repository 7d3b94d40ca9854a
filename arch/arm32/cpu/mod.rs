//! ARM32 CPU state
//!
//! Processor modes, the CPSR, and the general-purpose register frame saved
//! by the hyp-mode trap entry.

pub mod banked;
pub mod coproc;

use core::fmt;

use bitflags::bitflags;

use crate::utils::extract_field;

// Re-export commonly used types
pub use banked::BankedRegs;
pub use coproc::CopRegs;

/// Number of general-purpose registers in the trap frame (R0-R12)
pub const NUM_GPR: usize = 13;

/// ARM processor modes, as encoded in CPSR.M
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CpuMode {
    User = 0x10,
    Fiq = 0x11,
    Irq = 0x12,
    Svc = 0x13,
    Mon = 0x16,
    Abt = 0x17,
    Hyp = 0x1A,
    Und = 0x1B,
    Sys = 0x1F,
}

impl CpuMode {
    /// Decode the mode field of a CPSR value
    pub fn from_cpsr(cpsr: u32) -> Option<Self> {
        match extract_field(cpsr, 0, 5) {
            0x10 => Some(Self::User),
            0x11 => Some(Self::Fiq),
            0x12 => Some(Self::Irq),
            0x13 => Some(Self::Svc),
            0x16 => Some(Self::Mon),
            0x17 => Some(Self::Abt),
            0x1A => Some(Self::Hyp),
            0x1B => Some(Self::Und),
            0x1F => Some(Self::Sys),
            _ => None,
        }
    }

    /// Human-readable mode name
    pub fn name(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Fiq => "FIQ",
            Self::Irq => "IRQ",
            Self::Svc => "Supervisor",
            Self::Mon => "Monitor",
            Self::Abt => "Abort",
            Self::Hyp => "Hyp",
            Self::Und => "Undefined",
            Self::Sys => "System",
        }
    }
}

bitflags! {
    /// Current Program Status Register
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Cpsr: u32 {
        const N = 1 << 31;
        const Z = 1 << 30;
        const C = 1 << 29;
        const V = 1 << 28;
        const Q = 1 << 27;
        const J = 1 << 24;
        const E = 1 << 9;
        /// Asynchronous abort mask
        const A = 1 << 8;
        /// IRQ mask
        const I = 1 << 7;
        /// FIQ mask
        const F = 1 << 6;
        /// Thumb state
        const T = 1 << 5;
        /// Mode field
        const MODE = 0x1F;
    }
}

impl Cpsr {
    /// CPSR with `mode` and the given flags
    pub fn with_mode(mode: CpuMode, flags: Cpsr) -> Self {
        (flags - Cpsr::MODE) | Cpsr::from_bits_retain(mode as u32)
    }

    /// Every guest boots in SVC mode with A, I and F masked (0x1d3)
    pub fn guest_initial() -> Self {
        Self::with_mode(CpuMode::Svc, Cpsr::A | Cpsr::I | Cpsr::F)
    }

    /// Decoded mode field
    pub fn mode(self) -> Option<CpuMode> {
        CpuMode::from_cpsr(self.bits())
    }
}

/// Registers saved by the trap entry: R0-R12, LR, PC and CPSR
///
/// The layout matches the frame pushed by the hyp vector code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct ArchRegs {
    pub cpsr: u32,
    pub pc: u32,
    pub lr: u32,
    pub gpr: [u32; NUM_GPR],
}

impl ArchRegs {
    /// Boot-time frame of a guest starting at `entry`
    pub fn boot(entry: u32, cpsr: Cpsr) -> Self {
        Self {
            cpsr: cpsr.bits(),
            pc: entry,
            ..Self::default()
        }
    }

    /// Mode the frame was trapped from
    pub fn mode(&self) -> Option<CpuMode> {
        CpuMode::from_cpsr(self.cpsr)
    }
}

impl fmt::Display for ArchRegs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = self.mode().map_or("Unknown", CpuMode::name);
        write!(
            f,
            "cpsr: {:#010x} ({}) pc: {:#010x} lr: {:#010x}",
            self.cpsr, mode, self.pc, self.lr
        )
    }
}

#[cfg(target_arch = "arm")]
pub use self::hw::*;

#[cfg(target_arch = "arm")]
mod hw {
    use super::{ArchRegs, BankedRegs, CopRegs};
    use crate::arch::{CpuOps, IrqFlags};

    /// Physical ARMv7 CPU running in hyp mode
    #[derive(Debug, Default)]
    pub struct Armv7Cpu;

    impl CpuOps for Armv7Cpu {
        fn irq_disable(&mut self) -> IrqFlags {
            let cpsr: u32;
            unsafe {
                core::arch::asm!(
                    "mrs {0}, cpsr",
                    "cpsid i",
                    out(reg) cpsr,
                    options(nomem, nostack, preserves_flags)
                );
            }
            IrqFlags(cpsr)
        }

        fn irq_restore(&mut self, flags: IrqFlags) {
            unsafe {
                core::arch::asm!(
                    "msr cpsr_c, {0}",
                    in(reg) flags.0,
                    options(nomem, nostack, preserves_flags)
                );
            }
        }

        fn save_banked(&mut self, banked: &mut BankedRegs) {
            // SAFETY: hyp mode with virtualization extensions, IRQs masked.
            unsafe { banked.save_live() }
        }

        fn restore_banked(&mut self, banked: &BankedRegs) {
            // SAFETY: as above.
            unsafe { banked.restore_live() }
        }

        fn save_cop(&mut self, cop: &mut CopRegs) {
            // SAFETY: CP15 guest registers are accessible from hyp mode.
            unsafe { cop.save_live() }
        }

        fn restore_cop(&mut self, cop: &CopRegs) {
            // SAFETY: as above.
            unsafe { cop.restore_live() }
        }

        fn enter_guest(&mut self, regs: &ArchRegs) -> ! {
            // SAFETY: `regs` is a complete frame; eret drops to the guest
            // mode held in its CPSR and never comes back here.
            unsafe {
                core::arch::asm!(
                    "ldr r1, [r0, #0]",
                    "msr spsr_hyp, r1",
                    "ldr r1, [r0, #4]",
                    "msr elr_hyp, r1",
                    "ldr lr, [r0, #8]",
                    "add r0, r0, #12",
                    "ldm r0, {{r0-r12}}",
                    "eret",
                    in("r0") regs as *const ArchRegs,
                    options(noreturn)
                );
            }
        }
    }

    /// Read the physical counter (CNTPCT)
    pub fn read_cntpct() -> u64 {
        let lo: u32;
        let hi: u32;
        unsafe {
            core::arch::asm!(
                "isb",
                "mrrc p15, 0, {0}, {1}, c14",
                out(reg) lo,
                out(reg) hi,
                options(nomem, nostack, preserves_flags)
            );
        }
        ((hi as u64) << 32) | lo as u64
    }

    /// Program the hyp physical timer compare value (CNTHP_CVAL)
    pub fn write_cnthp_cval(value: u64) {
        unsafe {
            core::arch::asm!(
                "mcrr p15, 6, {0}, {1}, c14",
                "isb",
                in(reg) value as u32,
                in(reg) (value >> 32) as u32,
                options(nomem, nostack, preserves_flags)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0x1d3, Some(CpuMode::Svc) ; "svc with aif masked")]
    #[test_case(0x1da, Some(CpuMode::Hyp) ; "hyp")]
    #[test_case(0x10, Some(CpuMode::User) ; "user")]
    #[test_case(0x15, None ; "reserved encoding")]
    fn test_mode_decode(cpsr: u32, mode: Option<CpuMode>) {
        assert_eq!(CpuMode::from_cpsr(cpsr), mode);
    }

    #[test]
    fn test_guest_initial_cpsr() {
        let cpsr = Cpsr::guest_initial();
        assert_eq!(cpsr.bits(), 0x1d3);
        assert_eq!(cpsr.mode(), Some(CpuMode::Svc));
        assert!(cpsr.contains(Cpsr::I | Cpsr::F | Cpsr::A));
    }

    #[test]
    fn test_with_mode_replaces_mode_field() {
        let cpsr = Cpsr::with_mode(CpuMode::Irq, Cpsr::from_bits_retain(0x1d3));
        assert_eq!(cpsr.bits(), 0x1d2);
    }

    #[test]
    fn test_boot_frame() {
        let regs = ArchRegs::boot(0x8000_0000, Cpsr::guest_initial());
        assert_eq!(regs.pc, 0x8000_0000);
        assert_eq!(regs.mode(), Some(CpuMode::Svc));
        assert_eq!(regs.gpr, [0; NUM_GPR]);
        assert_eq!(regs.lr, 0);
    }
}
