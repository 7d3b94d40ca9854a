//! Physical interrupt classification
//!
//! Every interrupt taken in hyp mode is either the scheduling tick, an
//! interrupt owned by a guest, or one the hypervisor handles itself.

use crate::config::MAX_IRQS;
use crate::core::irq::{HostIrqHandler, Pirq, Virq, VirqMap, VirqMapEntry};
use crate::core::vmm::Vmid;
use crate::core::{Error, Result};

/// Where a physical interrupt goes
#[derive(Debug, Clone, Copy)]
pub enum IrqRoute {
    /// The scheduling timer fired
    Tick,
    /// Owned by a guest
    Guest(VirqMapEntry),
    /// Handled by the hypervisor
    Host(HostIrqHandler),
    /// Nobody claimed it
    Unrouted,
}

/// IRQ statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IrqStats {
    /// Total interrupts routed
    pub total: u64,
    /// Scheduling ticks
    pub ticks: u64,
    /// Interrupts forwarded to guests
    pub guest: u64,
    /// Interrupts handled by the hypervisor
    pub host: u64,
    /// Spurious or unclaimed interrupts
    pub unrouted: u64,
}

/// Routing state of the physical interrupt lines
pub struct IrqRouter {
    timer_irq: Pirq,
    virqmap: VirqMap,
    handlers: [Option<HostIrqHandler>; MAX_IRQS],
    stats: IrqStats,
}

impl IrqRouter {
    pub fn new(num_guests: usize, timer_irq: Pirq) -> Self {
        Self {
            timer_irq,
            virqmap: VirqMap::new(num_guests),
            handlers: [None; MAX_IRQS],
            stats: IrqStats::default(),
        }
    }

    pub fn timer_irq(&self) -> Pirq {
        self.timer_irq
    }

    pub fn virqmap(&self) -> &VirqMap {
        &self.virqmap
    }

    /// Route `pirq` to `virq` of guest `vmid`
    ///
    /// The timer line always belongs to the scheduler.
    pub fn map_irq(&mut self, pirq: Pirq, vmid: Vmid, virq: Virq) -> Result<()> {
        if pirq == self.timer_irq {
            return Err(Error::InvalidIrq);
        }
        self.virqmap.map(pirq, vmid, virq)
    }

    /// Drop the guest route of `pirq`
    pub fn unmap_irq(&mut self, pirq: Pirq) -> Result<Option<VirqMapEntry>> {
        self.virqmap.unmap(pirq)
    }

    /// Register a hypervisor handler for `irq`, replacing any previous one
    pub fn request_irq(&mut self, irq: Pirq, handler: HostIrqHandler) -> Result<()> {
        let idx = irq as usize;
        if idx >= MAX_IRQS || irq == self.timer_irq {
            return Err(Error::InvalidIrq);
        }

        self.handlers[idx] = Some(handler);
        log::debug!("irq: host handler for {}", irq);
        Ok(())
    }

    /// Remove the hypervisor handler of `irq`
    pub fn free_irq(&mut self, irq: Pirq) -> Result<()> {
        let slot = self
            .handlers
            .get_mut(irq as usize)
            .ok_or(Error::InvalidIrq)?;
        *slot = None;
        Ok(())
    }

    /// Classify `irq` and account for it
    ///
    /// A guest route takes precedence over a host handler registered for
    /// the same line.
    pub fn route(&mut self, irq: Pirq) -> Result<IrqRoute> {
        let idx = irq as usize;
        if idx >= MAX_IRQS {
            return Err(Error::InvalidIrq);
        }

        self.stats.total += 1;
        let route = if irq == self.timer_irq {
            self.stats.ticks += 1;
            IrqRoute::Tick
        } else if let Some(entry) = self.virqmap.for_pirq(irq)? {
            self.stats.guest += 1;
            IrqRoute::Guest(entry)
        } else if let Some(handler) = self.handlers[idx] {
            self.stats.host += 1;
            IrqRoute::Host(handler)
        } else {
            self.stats.unrouted += 1;
            IrqRoute::Unrouted
        };

        Ok(route)
    }

    pub fn stats(&self) -> IrqStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nop(_irq: Pirq) {}

    #[test]
    fn test_route_classification() {
        let mut router = IrqRouter::new(2, 26);
        router.map_irq(17, 1, 5).unwrap();
        router.request_irq(33, nop).unwrap();

        assert!(matches!(router.route(26), Ok(IrqRoute::Tick)));
        assert!(matches!(
            router.route(17),
            Ok(IrqRoute::Guest(VirqMapEntry { vmid: 1, virq: 5 }))
        ));
        assert!(matches!(router.route(33), Ok(IrqRoute::Host(_))));
        assert!(matches!(router.route(34), Ok(IrqRoute::Unrouted)));
        assert!(matches!(router.route(MAX_IRQS as Pirq), Err(Error::InvalidIrq)));

        assert_eq!(
            router.stats(),
            IrqStats {
                total: 4,
                ticks: 1,
                guest: 1,
                host: 1,
                unrouted: 1,
            }
        );
    }

    #[test]
    fn test_guest_route_wins_over_host() {
        let mut router = IrqRouter::new(2, 26);
        router.request_irq(40, nop).unwrap();
        router.map_irq(40, 0, 40).unwrap();
        assert!(matches!(router.route(40), Ok(IrqRoute::Guest(_))));

        router.unmap_irq(40).unwrap();
        assert!(matches!(router.route(40), Ok(IrqRoute::Host(_))));
        router.free_irq(40).unwrap();
        assert!(matches!(router.route(40), Ok(IrqRoute::Unrouted)));
    }

    #[test]
    fn test_timer_line_is_reserved() {
        let mut router = IrqRouter::new(1, 26);
        assert_eq!(router.request_irq(26, nop), Err(Error::InvalidIrq));
        assert_eq!(router.map_irq(26, 0, 27), Err(Error::InvalidIrq));
        assert_eq!(router.virqmap().for_pirq(26), Ok(None));
        assert_eq!(router.free_irq(MAX_IRQS as Pirq), Err(Error::InvalidIrq));
    }
}
