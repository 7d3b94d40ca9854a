//! Coprocessor state for ARMv7 guests
//!
//! Only CP15 carries per-guest state in this hypervisor.

pub mod cp15;

// Re-export commonly used types
pub use cp15::CopRegs;
