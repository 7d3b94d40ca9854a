//! Banked registers
//!
//! Every privileged mode has its own SP, LR and SPSR, and FIQ mode also
//! banks R8-R12. A guest switch moves the whole set as a unit.
//! Cortex-A15 has no accessible `sp_fiq`, so it is not part of the set.

/// Banked register set of one guest
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct BankedRegs {
    pub sp_usr: u32,
    pub spsr_svc: u32,
    pub sp_svc: u32,
    pub lr_svc: u32,
    pub spsr_abt: u32,
    pub sp_abt: u32,
    pub lr_abt: u32,
    pub spsr_und: u32,
    pub sp_und: u32,
    pub lr_und: u32,
    pub spsr_irq: u32,
    pub sp_irq: u32,
    pub lr_irq: u32,
    pub spsr_fiq: u32,
    pub lr_fiq: u32,
    pub r8_fiq: u32,
    pub r9_fiq: u32,
    pub r10_fiq: u32,
    pub r11_fiq: u32,
    pub r12_fiq: u32,
}

#[cfg(target_arch = "arm")]
macro_rules! mrs_banked {
    ($reg:literal) => {{
        let value: u32;
        core::arch::asm!(
            concat!("mrs {0}, ", $reg),
            out(reg) value,
            options(nomem, nostack, preserves_flags)
        );
        value
    }};
}

#[cfg(target_arch = "arm")]
macro_rules! msr_banked {
    ($reg:literal, $value:expr) => {
        core::arch::asm!(
            concat!("msr ", $reg, ", {0}"),
            in(reg) $value,
            options(nomem, nostack, preserves_flags)
        )
    };
}

#[cfg(target_arch = "arm")]
impl BankedRegs {
    /// Read the live banked registers
    ///
    /// # Safety
    /// Hyp mode only, with IRQs masked.
    pub(crate) unsafe fn save_live(&mut self) {
        self.sp_usr = mrs_banked!("sp_usr");
        self.spsr_svc = mrs_banked!("spsr_svc");
        self.sp_svc = mrs_banked!("sp_svc");
        self.lr_svc = mrs_banked!("lr_svc");
        self.spsr_abt = mrs_banked!("spsr_abt");
        self.sp_abt = mrs_banked!("sp_abt");
        self.lr_abt = mrs_banked!("lr_abt");
        self.spsr_und = mrs_banked!("spsr_und");
        self.sp_und = mrs_banked!("sp_und");
        self.lr_und = mrs_banked!("lr_und");
        self.spsr_irq = mrs_banked!("spsr_irq");
        self.sp_irq = mrs_banked!("sp_irq");
        self.lr_irq = mrs_banked!("lr_irq");
        self.spsr_fiq = mrs_banked!("spsr_fiq");
        self.lr_fiq = mrs_banked!("lr_fiq");
        self.r8_fiq = mrs_banked!("r8_fiq");
        self.r9_fiq = mrs_banked!("r9_fiq");
        self.r10_fiq = mrs_banked!("r10_fiq");
        self.r11_fiq = mrs_banked!("r11_fiq");
        self.r12_fiq = mrs_banked!("r12_fiq");
    }

    /// Write the live banked registers
    ///
    /// # Safety
    /// Hyp mode only, with IRQs masked.
    pub(crate) unsafe fn restore_live(&self) {
        msr_banked!("sp_usr", self.sp_usr);
        msr_banked!("spsr_svc", self.spsr_svc);
        msr_banked!("sp_svc", self.sp_svc);
        msr_banked!("lr_svc", self.lr_svc);
        msr_banked!("spsr_abt", self.spsr_abt);
        msr_banked!("sp_abt", self.sp_abt);
        msr_banked!("lr_abt", self.lr_abt);
        msr_banked!("spsr_und", self.spsr_und);
        msr_banked!("sp_und", self.sp_und);
        msr_banked!("lr_und", self.lr_und);
        msr_banked!("spsr_irq", self.spsr_irq);
        msr_banked!("sp_irq", self.sp_irq);
        msr_banked!("lr_irq", self.lr_irq);
        msr_banked!("spsr_fiq", self.spsr_fiq);
        msr_banked!("lr_fiq", self.lr_fiq);
        msr_banked!("r8_fiq", self.r8_fiq);
        msr_banked!("r9_fiq", self.r9_fiq);
        msr_banked!("r10_fiq", self.r10_fiq);
        msr_banked!("r11_fiq", self.r11_fiq);
        msr_banked!("r12_fiq", self.r12_fiq);
    }
}
