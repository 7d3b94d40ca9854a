//! CP15 guest state for ARMv7
//!
//! The subset of the system control coprocessor that differs between guests
//! and therefore travels with a guest switch: the vector base, the stage-1
//! translation table registers and SCTLR.
//! Reference: ARM DDI 0406C.d - Chapter B3 - System Control Programmers' Model

/// Per-guest CP15 registers saved and restored on a switch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct CopRegs {
    /// VBAR - Vector Base Address Register
    pub vbar: u32,
    /// TTBR0 - Translation Table Base Register 0
    pub ttbr0: u32,
    /// TTBR1 - Translation Table Base Register 1
    pub ttbr1: u32,
    /// TTBCR - Translation Table Base Control Register
    pub ttbcr: u32,
    /// SCTLR - System Control Register
    pub sctlr: u32,
}

#[cfg(target_arch = "arm")]
macro_rules! mrc_p15 {
    ($crn:literal, $opc1:literal, $crm:literal, $opc2:literal) => {{
        let value: u32;
        core::arch::asm!(
            concat!("mrc p15, ", $opc1, ", {0}, ", $crn, ", ", $crm, ", ", $opc2),
            out(reg) value,
            options(nomem, nostack, preserves_flags)
        );
        value
    }};
}

#[cfg(target_arch = "arm")]
macro_rules! mcr_p15 {
    ($crn:literal, $opc1:literal, $crm:literal, $opc2:literal, $value:expr) => {
        core::arch::asm!(
            concat!("mcr p15, ", $opc1, ", {0}, ", $crn, ", ", $crm, ", ", $opc2),
            in(reg) $value,
            options(nostack, preserves_flags)
        )
    };
}

#[cfg(target_arch = "arm")]
impl CopRegs {
    /// Read the live guest CP15 registers
    ///
    /// # Safety
    /// Hyp mode only.
    pub(crate) unsafe fn save_live(&mut self) {
        self.vbar = mrc_p15!("c12", "0", "c0", "0");
        self.ttbr0 = mrc_p15!("c2", "0", "c0", "0");
        self.ttbr1 = mrc_p15!("c2", "0", "c0", "1");
        self.ttbcr = mrc_p15!("c2", "0", "c0", "2");
        self.sctlr = mrc_p15!("c1", "0", "c0", "0");
    }

    /// Write the live guest CP15 registers
    ///
    /// # Safety
    /// Hyp mode only.
    pub(crate) unsafe fn restore_live(&self) {
        mcr_p15!("c12", "0", "c0", "0", self.vbar);
        mcr_p15!("c2", "0", "c0", "0", self.ttbr0);
        mcr_p15!("c2", "0", "c0", "1", self.ttbr1);
        mcr_p15!("c2", "0", "c0", "2", self.ttbcr);
        mcr_p15!("c1", "0", "c0", "0", self.sctlr);
        core::arch::asm!("isb", options(nostack, preserves_flags));
    }
}
