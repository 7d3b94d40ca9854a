//! Physical to virtual interrupt routing table
//!
//! Filled at boot from the board description: every physical interrupt
//! that belongs to a guest is recorded together with the owning guest and
//! the virtual number the guest expects.

use crate::config::MAX_IRQS;
use crate::core::irq::{Pirq, Virq};
use crate::core::vmm::Vmid;
use crate::core::{Error, Result};

/// Owner of a physical interrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirqMapEntry {
    pub vmid: Vmid,
    pub virq: Virq,
}

/// Static routing table, indexed by physical interrupt number
pub struct VirqMap {
    entries: [Option<VirqMapEntry>; MAX_IRQS],
    num_guests: usize,
}

impl VirqMap {
    pub fn new(num_guests: usize) -> Self {
        Self {
            entries: [None; MAX_IRQS],
            num_guests,
        }
    }

    fn index(pirq: Pirq) -> Result<usize> {
        let idx = pirq as usize;
        if idx < MAX_IRQS {
            Ok(idx)
        } else {
            Err(Error::InvalidIrq)
        }
    }

    /// Route `pirq` to `virq` of guest `vmid`, replacing any previous owner
    pub fn map(&mut self, pirq: Pirq, vmid: Vmid, virq: Virq) -> Result<()> {
        let idx = Self::index(pirq)?;
        if vmid >= self.num_guests {
            return Err(Error::InvalidVmid);
        }
        if virq as usize >= MAX_IRQS {
            return Err(Error::InvalidIrq);
        }

        if let Some(old) = self.entries[idx].replace(VirqMapEntry { vmid, virq }) {
            log::warn!(
                "virqmap: pirq {} moved from vmid {} virq {}",
                pirq,
                old.vmid,
                old.virq
            );
        }
        log::debug!("virqmap: pirq {} -> vmid {} virq {}", pirq, vmid, virq);
        Ok(())
    }

    /// Drop the route of `pirq`, returning the previous owner
    pub fn unmap(&mut self, pirq: Pirq) -> Result<Option<VirqMapEntry>> {
        Ok(self.entries[Self::index(pirq)?].take())
    }

    /// Owner of `pirq`, if any
    pub fn for_pirq(&self, pirq: Pirq) -> Result<Option<VirqMapEntry>> {
        Ok(self.entries[Self::index(pirq)?])
    }

}
