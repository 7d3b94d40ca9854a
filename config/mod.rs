//! Configuration management
//!
//! Compile-time capacities and the boot-time configuration handed over by
//! platform bring-up.

use crate::arch::arm32::Cpsr;
use crate::core::irq::Pirq;
use crate::{Error, Result};

/// Maximum number of guests the hypervisor can host
pub const MAX_GUESTS: usize = 4;

/// Number of interrupt slots per guest (VGIC list registers)
pub const MAX_SLOTS: usize = 64;

/// Number of physical interrupt lines the distributor can route
pub const MAX_IRQS: usize = 1024;

/// Default number of configured guests
pub const DEFAULT_NUM_GUESTS: usize = 2;

/// Default scheduling quantum in timer ticks (1ms at 100MHz)
pub const DEFAULT_SCHED_INTERVAL: u64 = 100_000;

/// Non-secure hypervisor physical timer PPI
pub const DEFAULT_TIMER_IRQ: Pirq = 26;

/// Default guest entry point
pub const DEFAULT_GUEST_ENTRY: u32 = 0x8000_0000;

/// Global hypervisor configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HypervisorConfig {
    /// Number of guests to bring up, at most [`MAX_GUESTS`]
    pub num_guests: usize,
    /// Scheduling quantum in timer ticks
    pub sched_interval: u64,
    /// Physical interrupt of the scheduling timer
    pub timer_irq: Pirq,
    /// Entry point every guest starts at
    pub guest_entry: u32,
    /// Initial CPSR of every guest
    pub guest_cpsr: Cpsr,
}

impl Default for HypervisorConfig {
    fn default() -> Self {
        Self {
            num_guests: DEFAULT_NUM_GUESTS,
            sched_interval: DEFAULT_SCHED_INTERVAL,
            timer_irq: DEFAULT_TIMER_IRQ,
            guest_entry: DEFAULT_GUEST_ENTRY,
            guest_cpsr: Cpsr::guest_initial(),
        }
    }
}

impl HypervisorConfig {
    /// Configuration for `num_guests` guests, defaults elsewhere
    pub fn with_guests(num_guests: usize) -> Self {
        Self {
            num_guests,
            ..Self::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.num_guests == 0 || self.num_guests > MAX_GUESTS {
            return Err(Error::InvalidConfig);
        }

        if self.sched_interval == 0 {
            return Err(Error::InvalidConfig);
        }

        if self.timer_irq as usize >= MAX_IRQS {
            return Err(Error::InvalidConfig);
        }

        Ok(())
    }
}
