//! Core hypervisor modules
//!
//! Guest context management, scheduling, and interrupt routing: the code
//! that runs on every trap into the hypervisor.

pub mod hypervisor;
pub mod irq;
pub mod sched;
pub mod sync;
pub mod vmm;


use ::core::fmt;

use crate::core::irq::Slot;

/// Core error type
///
/// Every variant is a programming or configuration error. None of them is
/// transient, so callers abort the operation instead of retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Guest identifier outside the configured range
    InvalidVmid,
    /// Slot index beyond the per-guest capacity
    SlotOutOfRange,
    /// The current guest is held exclusively and cannot be switched away from
    GuestLocked,
    /// Target guest has not been marked waiting yet
    GuestNotReady,
    /// The interrupt number already occupies another slot of this guest
    IrqInUse(Slot),
    /// No free slot left in the guest's table
    SlotsExhausted,
    /// Interrupt number outside the distributor range
    InvalidIrq,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidVmid => f.write_str("invalid vmid"),
            Error::SlotOutOfRange => f.write_str("slot out of range"),
            Error::GuestLocked => f.write_str("guest is locked"),
            Error::GuestNotReady => f.write_str("guest is not ready"),
            Error::IrqInUse(slot) => write!(f, "irq already mapped at slot {}", slot),
            Error::SlotsExhausted => f.write_str("no free slot"),
            Error::InvalidIrq => f.write_str("invalid irq number"),
        }
    }
}

/// Result type for core operations
pub type Result<T> = ::core::result::Result<T, Error>;
