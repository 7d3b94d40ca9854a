//! Interrupt handling module
//!
//! Physical interrupts either belong to a guest, in which case they are
//! queued into that guest's slot table as a virtual interrupt, or to the
//! hypervisor itself (the scheduling timer and host devices).

pub mod router;
pub mod slot;
pub mod virqmap;

pub use router::{IrqRoute, IrqRouter, IrqStats};
pub use slot::{SlotEntry, SlotRouter};
pub use virqmap::{VirqMap, VirqMapEntry};

/// Physical interrupt number, as seen by the distributor
pub type Pirq = u32;

/// Virtual interrupt number, as seen by a guest
pub type Virq = u32;

/// Index into a guest's slot table
pub type Slot = usize;

/// Hypervisor-side handler of a physical interrupt
pub type HostIrqHandler = fn(irq: Pirq);
