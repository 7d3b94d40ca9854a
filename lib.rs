//! khyp - a small ARMv7 Type-1 hypervisor core
//!
//! This library holds the part of the hypervisor that runs on every trap:
//! per-guest CPU context switching, the guest scheduler, and the routing of
//! physical interrupts into each guest's virtual interrupt space.
//!
//! Platform bring-up, guest image loading and device emulation live outside
//! this crate and talk to it through [`Hypervisor`] and [`arch::CpuOps`].

#![cfg_attr(target_os = "none", no_std)]

// Core modules
pub mod utils;
pub mod config;

// Architecture-specific code
pub mod arch;

// Core hypervisor modules
pub mod core;

use ::core::fmt;

pub use crate::config::HypervisorConfig;
pub use crate::core::hypervisor::{Hypervisor, IrqOutcome};
pub use crate::core::irq::{Pirq, Slot, Virq};
pub use crate::core::sched::{RoundRobin, SchedPolicy, ScheduleOutcome, Scheduler};
pub use crate::core::vmm::{GuestContext, GuestState, SwitchOutcome, Vmid};

/// khyp version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common error type for khyp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Configuration rejected by [`HypervisorConfig::validate`]
    InvalidConfig,
    /// Core error
    CoreError(crate::core::Error),
}

impl From<crate::core::Error> for Error {
    fn from(err: crate::core::Error) -> Self {
        Error::CoreError(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidConfig => f.write_str("invalid hypervisor configuration"),
            Error::CoreError(err) => write!(f, "{}", err),
        }
    }
}

/// Result type alias
pub type Result<T> = ::core::result::Result<T, Error>;

#[cfg(all(not(test), target_os = "none"))]
#[panic_handler]
fn panic(info: &::core::panic::PanicInfo) -> ! {
    utils::log::panic_write(format_args!("hypervisor panic: {}", info));
    arch::halt()
}
