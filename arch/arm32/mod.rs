//! ARM32 Architecture Module
//!
//! ARMv7 virtualization-extension support: the guest register model
//! (trap frame, banked registers, CP15 state) and, on ARM targets, the
//! backend that moves that state in and out of the physical CPU.
//!
//! # Usage
//!
//! ```rust,ignore
//! use khyp::arch::arm32::{ArchRegs, Cpsr, CpuMode};
//!
//! let mut regs = ArchRegs::default();
//! regs.pc = 0x8000_0000;
//! regs.cpsr = Cpsr::guest_initial().bits();
//! assert_eq!(regs.mode(), Some(CpuMode::Svc));
//! ```

pub mod cpu;

// Re-export commonly used types
pub use cpu::{coproc, ArchRegs, BankedRegs, CopRegs, CpuMode, Cpsr};

#[cfg(target_arch = "arm")]
pub use cpu::Armv7Cpu;
