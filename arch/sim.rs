//! Simulated CPU backend
//!
//! Keeps the "live" banked and CP15 registers in memory so the switch path
//! can run on hosts without ARMv7 virtualization extensions. It also counts
//! how the switch path uses it, which the tests rely on.

use crate::arch::arm32::{ArchRegs, BankedRegs, CopRegs};
use crate::arch::{CpuOps, IrqFlags};

/// Software register file standing in for the physical CPU
#[derive(Debug, Default, Clone)]
pub struct SimCpu {
    /// Live banked registers
    pub banked: BankedRegs,
    /// Live CP15 state
    pub cop: CopRegs,
    irqs_masked: bool,
    saves: usize,
    restores: usize,
    unmasked_accesses: usize,
}

impl SimCpu {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether IRQs are currently masked
    pub fn irqs_masked(&self) -> bool {
        self.irqs_masked
    }

    /// Number of banked + CP15 save pairs performed
    pub fn saves(&self) -> usize {
        self.saves
    }

    /// Number of banked + CP15 restore pairs performed
    pub fn restores(&self) -> usize {
        self.restores
    }

    /// State accesses made while IRQs were unmasked; always zero on a
    /// correct switch path
    pub fn unmasked_accesses(&self) -> usize {
        self.unmasked_accesses
    }

    fn touch(&mut self) {
        if !self.irqs_masked {
            self.unmasked_accesses += 1;
        }
    }
}

impl CpuOps for SimCpu {
    fn irq_disable(&mut self) -> IrqFlags {
        let prev = IrqFlags(self.irqs_masked as u32);
        self.irqs_masked = true;
        prev
    }

    fn irq_restore(&mut self, flags: IrqFlags) {
        self.irqs_masked = flags.0 != 0;
    }

    fn save_banked(&mut self, banked: &mut BankedRegs) {
        self.touch();
        *banked = self.banked;
        self.saves += 1;
    }

    fn restore_banked(&mut self, banked: &BankedRegs) {
        self.touch();
        self.banked = *banked;
        self.restores += 1;
    }

    fn save_cop(&mut self, cop: &mut CopRegs) {
        self.touch();
        *cop = self.cop;
    }

    fn restore_cop(&mut self, cop: &CopRegs) {
        self.touch();
        self.cop = *cop;
    }

    fn enter_guest(&mut self, regs: &ArchRegs) -> ! {
        log::info!("sim: no guest execution, parking at {}", regs);
        crate::arch::halt()
    }
}
