//! Per-guest interrupt slot tables
//!
//! Each guest owns [`MAX_SLOTS`] slots, one per VGIC list register. A slot
//! pairs the physical interrupt that fired with the virtual interrupt the
//! guest sees, so both directions resolve in a single lookup.
//!
//! The two halves of a slot are set and cleared independently: the
//! injection path fills both, while the emulation path may rewrite one.
//! Within a guest, a value never occupies two slots.

use crate::config::{MAX_GUESTS, MAX_SLOTS};
use crate::core::irq::{Pirq, Slot, Virq};
use crate::core::sync::{SpinLock, SpinLockGuard};
use crate::core::vmm::Vmid;
use crate::core::{Error, Result};

/// One slot of a guest's table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotEntry {
    pub pirq: Option<Pirq>,
    pub virq: Option<Virq>,
}

impl SlotEntry {
    pub const EMPTY: Self = Self {
        pirq: None,
        virq: None,
    };

    /// Both halves empty
    pub fn is_free(&self) -> bool {
        self.pirq.is_none() && self.virq.is_none()
    }
}

struct SlotTable {
    entries: [SlotEntry; MAX_SLOTS],
}

impl SlotTable {
    const EMPTY: Self = Self {
        entries: [SlotEntry::EMPTY; MAX_SLOTS],
    };

    fn find_pirq(&self, pirq: Pirq) -> Option<Slot> {
        self.entries.iter().position(|e| e.pirq == Some(pirq))
    }

    fn find_virq(&self, virq: Virq) -> Option<Slot> {
        self.entries.iter().position(|e| e.virq == Some(virq))
    }

    fn free(&self) -> Option<Slot> {
        self.entries.iter().position(SlotEntry::is_free)
    }

    fn claim_pirq(&mut self, slot: Slot, pirq: Pirq) -> Result<()> {
        match self.find_pirq(pirq) {
            Some(other) if other != slot => Err(Error::IrqInUse(other)),
            _ => {
                self.entries[slot].pirq = Some(pirq);
                Ok(())
            }
        }
    }

    fn claim_virq(&mut self, slot: Slot, virq: Virq) -> Result<()> {
        match self.find_virq(virq) {
            Some(other) if other != slot => Err(Error::IrqInUse(other)),
            _ => {
                self.entries[slot].virq = Some(virq);
                Ok(())
            }
        }
    }
}

/// Slot tables of every configured guest
pub struct SlotRouter {
    tables: [SpinLock<SlotTable>; MAX_GUESTS],
    num_guests: usize,
}

impl SlotRouter {
    /// Create empty tables for `num_guests` guests
    pub fn new(num_guests: usize) -> Self {
        Self {
            tables: ::core::array::from_fn(|_| SpinLock::new(SlotTable::EMPTY)),
            num_guests: num_guests.min(MAX_GUESTS),
        }
    }

    /// Clear every slot of every guest
    pub fn init(&self) {
        for table in &self.tables[..self.num_guests] {
            *table.lock() = SlotTable::EMPTY;
        }
    }

    fn table(&self, vmid: Vmid) -> Result<SpinLockGuard<'_, SlotTable>> {
        if vmid < self.num_guests {
            Ok(self.tables[vmid].lock())
        } else {
            Err(Error::InvalidVmid)
        }
    }

    fn table_at(&self, vmid: Vmid, slot: Slot) -> Result<SpinLockGuard<'_, SlotTable>> {
        let table = self.table(vmid)?;
        if slot < MAX_SLOTS {
            Ok(table)
        } else {
            Err(Error::SlotOutOfRange)
        }
    }

    /// Copy of one slot
    pub fn entry(&self, vmid: Vmid, slot: Slot) -> Result<SlotEntry> {
        Ok(self.table_at(vmid, slot)?.entries[slot])
    }

    pub fn pirq_set(&self, vmid: Vmid, slot: Slot, pirq: Pirq) -> Result<()> {
        self.table_at(vmid, slot)?.claim_pirq(slot, pirq)
    }

    pub fn virq_set(&self, vmid: Vmid, slot: Slot, virq: Virq) -> Result<()> {
        self.table_at(vmid, slot)?.claim_virq(slot, virq)
    }

    pub fn pirq_get(&self, vmid: Vmid, slot: Slot) -> Result<Option<Pirq>> {
        Ok(self.table_at(vmid, slot)?.entries[slot].pirq)
    }

    pub fn virq_get(&self, vmid: Vmid, slot: Slot) -> Result<Option<Virq>> {
        Ok(self.table_at(vmid, slot)?.entries[slot].virq)
    }

    /// Slot holding `virq` for this guest
    pub fn slotvirq_getslot(&self, vmid: Vmid, virq: Virq) -> Result<Option<Slot>> {
        Ok(self.table(vmid)?.find_virq(virq))
    }

    /// Slot holding `pirq` for this guest
    pub fn slotpirq_getslot(&self, vmid: Vmid, pirq: Pirq) -> Result<Option<Slot>> {
        Ok(self.table(vmid)?.find_pirq(pirq))
    }

    /// Clear the physical half of a slot, leaving the virtual half
    pub fn pirq_clear(&self, vmid: Vmid, slot: Slot) -> Result<()> {
        self.table_at(vmid, slot)?.entries[slot].pirq = None;
        Ok(())
    }

    /// Clear the virtual half of a slot, leaving the physical half
    pub fn virq_clear(&self, vmid: Vmid, slot: Slot) -> Result<()> {
        self.table_at(vmid, slot)?.entries[slot].virq = None;
        Ok(())
    }

    /// Lowest slot with both halves empty
    pub fn free_slot(&self, vmid: Vmid) -> Result<Option<Slot>> {
        Ok(self.table(vmid)?.free())
    }

    /// Queue `virq` for the guest, backed by physical `pirq`
    ///
    /// A slot already carrying `virq` is reused, otherwise the lowest free
    /// one is taken. The table stays locked for the whole update.
    pub fn inject(&self, vmid: Vmid, pirq: Pirq, virq: Virq) -> Result<Slot> {
        let mut table = self.table(vmid)?;
        let slot = table
            .find_virq(virq)
            .or_else(|| table.free())
            .ok_or(Error::SlotsExhausted)?;

        table.claim_pirq(slot, pirq)?;
        table.entries[slot].virq = Some(virq);

        log::trace!("slot: vmid {} slot {} <- ({}, {})", vmid, slot, pirq, virq);
        Ok(slot)
    }

    /// End of interrupt for `virq`: release its slot
    ///
    /// Returns the physical interrupt the slot carried, to be deactivated
    /// at the distributor, or `None` if `virq` was not queued.
    pub fn complete(&self, vmid: Vmid, virq: Virq) -> Result<Option<Pirq>> {
        let mut table = self.table(vmid)?;
        let Some(slot) = table.find_virq(virq) else {
            return Ok(None);
        };

        let pirq = table.entries[slot].pirq;
        table.entries[slot] = SlotEntry::EMPTY;
        Ok(pirq)
    }
}
